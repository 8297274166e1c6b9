//! serenity-backed Discord bot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use serenity::builder::{
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, CreateMessage,
};
use serenity::http::{Http, HttpBuilder, HttpError};
use serenity::model::application::{
    Command, CommandDataOptionValue, CommandInteraction, CommandOptionType, InstallationContext,
    Interaction, InteractionContext,
};
use serenity::model::prelude::*;
use serenity::prelude::*;

use super::{classify_http_error, DiscordConfig};
use crate::channels::{Delivery, Reporter};
use crate::commands::{
    self, render_command_error, render_event, render_rejection, render_stop, CommandSpec,
    InstallKind, InvocationContext, OptionKind, OptionValue, SlashCommand,
};
use crate::controller::{ControllerConfig, RepeatController};
use crate::error::{CommandError, DeliveryError, Error, Result};
use crate::types::{RunEvent, RunKey, StartRequest};

/// Posts messages with `ChannelId::send_message`.
///
/// 429 responses surface as [`DeliveryError::RateLimited`] only when `http`
/// has its ratelimiter disabled; see [`delivery_http`].
pub struct DiscordDelivery {
    http: Arc<Http>,
}

impl DiscordDelivery {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

/// HTTP client for [`DiscordDelivery`], without serenity's ratelimiter.
///
/// serenity would otherwise sleep through 429s itself and the controller's
/// rate-limit budget would never see them. The error body does not carry the
/// `Retry-After` header, so the controller falls back to its default delay.
pub fn delivery_http(token: &str) -> Http {
    HttpBuilder::new(token).ratelimiter_disabled(true).build()
}

fn map_send_error(err: serenity::Error) -> DeliveryError {
    match &err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => classify_http_error(
            response.status_code.as_u16(),
            Some(response.error.code),
            &response.error.message,
            None,
        ),
        _ => DeliveryError::Other(err.to_string()),
    }
}

#[async_trait]
impl Delivery for DiscordDelivery {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, destination_id: &str, message: &str) -> std::result::Result<(), DeliveryError> {
        let channel_id: u64 = destination_id
            .parse()
            .map_err(|e| DeliveryError::Other(format!("Invalid channel_id: {}", e)))?;
        if channel_id == 0 {
            return Err(DeliveryError::Other("Invalid channel_id: 0".to_string()));
        }

        ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().content(message))
            .await
            .map(|_| ())
            .map_err(map_send_error)
    }
}

/// Answers the interaction that started a run.
///
/// The first event becomes the interaction response, later ones are sent as
/// follow-ups. All replies are ephemeral.
pub struct InteractionReporter {
    http: Arc<Http>,
    interaction: CommandInteraction,
    responded: AtomicBool,
}

impl InteractionReporter {
    pub fn new(http: Arc<Http>, interaction: CommandInteraction) -> Self {
        Self {
            http,
            interaction,
            responded: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Reporter for InteractionReporter {
    async fn report(&self, key: &RunKey, event: RunEvent) {
        let content = render_event(&event);

        let result = if !self.responded.swap(true, Ordering::SeqCst) {
            self.interaction
                .create_response(
                    &self.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content(content)
                            .ephemeral(true),
                    ),
                )
                .await
        } else {
            self.interaction
                .create_followup(
                    &self.http,
                    CreateInteractionResponseFollowup::new()
                        .content(content)
                        .ephemeral(true),
                )
                .await
                .map(|_| ())
        };

        if let Err(e) = result {
            tracing::warn!("Failed to report to {}: {}", key, e);
        }
    }
}

/// Event handler for Discord events.
struct Handler {
    controller: Arc<RepeatController>,
    config: DiscordConfig,
    definitions: Vec<CommandSpec>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("Discord bot ready as {}", ready.user.name);

        if !self.config.register_commands {
            return;
        }

        let commands: Vec<CreateCommand> = self.definitions.iter().map(build_command).collect();
        match Command::set_global_commands(&ctx.http, commands).await {
            Ok(registered) => tracing::info!("Registered {} global command(s)", registered.len()),
            Err(e) => tracing::error!("Failed to register slash commands: {:?}", e),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            self.handle_command(&ctx, command).await;
        }
    }
}

impl Handler {
    async fn handle_command(&self, ctx: &Context, command: CommandInteraction) {
        let user_id = command.user.id.to_string();
        let guild_id = command.guild_id.map(|g| g.get());

        if !self.config.is_allowed(&user_id, guild_id) {
            reply(ctx, &command, "You don't have permission to use this command.").await;
            return;
        }

        let options: Vec<(String, OptionValue)> = command
            .data
            .options
            .iter()
            .filter_map(|o| convert_option(&o.value).map(|v| (o.name.clone(), v)))
            .collect();
        let key = RunKey::new(user_id, command.channel_id.get().to_string());

        match SlashCommand::parse(&command.data.name, &options) {
            Ok(SlashCommand::Start { message, count }) => {
                let reporter = Arc::new(InteractionReporter::new(ctx.http.clone(), command.clone()));
                let request = StartRequest::new(key, message, count);
                if let Err(e) = self.controller.start(request, reporter) {
                    tracing::debug!("Start rejected: {}", e);
                    reply(ctx, &command, &render_rejection(&e)).await;
                }
            }
            Ok(SlashCommand::Stop { here }) => {
                let destination = here.then_some(key.destination_id.as_str());
                let result = self.controller.stop(&key.initiator_id, destination);
                reply(ctx, &command, &render_stop(&result)).await;
            }
            Err(CommandError::UnknownCommand(name)) => {
                tracing::debug!("Ignoring unknown command /{}", name);
            }
            Err(e) => reply(ctx, &command, &render_command_error(&e)).await,
        }
    }
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    );
    if let Err(e) = command.create_response(&ctx.http, response).await {
        tracing::warn!("Failed to reply to /{}: {}", command.data.name, e);
    }
}

fn convert_option(value: &CommandDataOptionValue) -> Option<OptionValue> {
    match value {
        CommandDataOptionValue::String(s) => Some(OptionValue::String(s.clone())),
        CommandDataOptionValue::Integer(n) => Some(OptionValue::Integer(*n)),
        CommandDataOptionValue::Boolean(b) => Some(OptionValue::Boolean(*b)),
        _ => None,
    }
}

fn build_command(spec: &CommandSpec) -> CreateCommand {
    let installs = spec
        .installs
        .iter()
        .map(|kind| match kind {
            InstallKind::Guild => InstallationContext::Guild,
            InstallKind::User => InstallationContext::User,
        })
        .collect();
    let contexts = spec
        .contexts
        .iter()
        .map(|context| match context {
            InvocationContext::Guild => InteractionContext::Guild,
            InvocationContext::BotDm => InteractionContext::BotDm,
            InvocationContext::PrivateChannel => InteractionContext::PrivateChannel,
        })
        .collect();

    let base = CreateCommand::new(spec.name)
        .description(spec.description.clone())
        .integration_types(installs)
        .contexts(contexts);

    spec.options.iter().fold(
        base,
        |command, option| {
            let kind = match option.kind {
                OptionKind::String => CommandOptionType::String,
                OptionKind::Integer => CommandOptionType::Integer,
                OptionKind::Boolean => CommandOptionType::Boolean,
            };
            let mut built = CreateCommandOption::new(kind, option.name, option.description.clone())
                .required(option.required);

            match option.kind {
                OptionKind::Integer => {
                    if let Some(min) = option.min {
                        built = built.min_int_value(u64::from(min));
                    }
                    if let Some(max) = option.max {
                        built = built.max_int_value(u64::from(max));
                    }
                }
                OptionKind::String => {
                    if let Some(min) = option.min {
                        built = built.min_length(min.min(u16::MAX as u32) as u16);
                    }
                    if let Some(max) = option.max {
                        built = built.max_length(max.min(u16::MAX as u32) as u16);
                    }
                }
                OptionKind::Boolean => {}
            }

            command.add_option(built)
        },
    )
}

/// The Discord bot: gateway client plus controller.
pub struct DiscordBot {
    config: DiscordConfig,
    controller: ControllerConfig,
}

impl DiscordBot {
    pub fn new(config: DiscordConfig, controller: ControllerConfig) -> Self {
        Self { config, controller }
    }

    /// Connect and serve commands until the gateway closes or Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let http = Arc::new(delivery_http(&self.config.token));
        let delivery = Arc::new(DiscordDelivery::new(http));
        let controller = Arc::new(RepeatController::new(self.controller.clone(), delivery)?);

        let handler = Handler {
            controller: Arc::clone(&controller),
            config: self.config.clone(),
            definitions: commands::definitions(&self.controller),
        };

        // Slash commands only need the guilds intent.
        let mut builder = Client::builder(&self.config.token, GatewayIntents::GUILDS)
            .event_handler(handler);
        if self.config.application_id != 0 {
            builder = builder.application_id(ApplicationId::new(self.config.application_id));
        }
        let mut client = builder
            .await
            .map_err(|e| Error::Other(format!("Discord connection failed: {}", e)))?;

        let shard_manager = client.shard_manager.clone();
        tokio::select! {
            result = client.start() => {
                result.map_err(|e| Error::Other(format!("Discord client error: {}", e)))?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down, stopping {} active run(s)", controller.registry().len());
                // Runs report through the HTTP API, so let them finish
                // before the gateway goes away.
                if tokio::time::timeout(SHUTDOWN_GRACE, controller.shutdown()).await.is_err() {
                    tracing::warn!("Runs still active after {:?}, shutting down anyway", SHUTDOWN_GRACE);
                }
                shard_manager.shutdown_all().await;
            }
        }

        Ok(())
    }
}

const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(10);
