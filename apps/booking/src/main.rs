use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use client_core::{
    session::{self, TOKEN_KEY},
    CatalogApi, FileSessionStore, GraphQlError, NavigationService, Notification,
    NotificationLevel, Notifier, ReservationWorkflow, RoomTypeOption, SessionContext,
    SessionStore, SessionUser, SubmissionResult, SubmitOutcome, WorkflowDependencies,
};
use shared::{
    domain::{DateAnchor, HotelId, RoomTypeId, UserId},
    error::ErrorCode,
    protocol::RoomTypesQuery,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(name = "booking", about = "Book hotel rooms against the booking GraphQL API")]
struct Cli {
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Overrides the configured GraphQL endpoint.
    #[arg(long)]
    graphql_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the room types offered by the API.
    RoomTypes,
    /// Submit one reservation for the signed-in user.
    Book {
        #[arg(long)]
        hotel_id: String,
        #[arg(long)]
        room_type: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        persons: u32,
    },
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    Show,
    /// Store the signed-in user and token.
    Set {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        firstname: Option<String>,
        #[arg(long)]
        lastname: Option<String>,
    },
    Clear,
}

struct ConsoleNavigator;

impl NavigationService for ConsoleNavigator {
    fn go_back(&self) {
        println!("<- back to hotel list");
    }

    fn navigate(&self, route: &str) {
        println!("-> {route}");
    }
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => {
                println!("[{}] {}", notification.title, notification.body)
            }
            NotificationLevel::Error => {
                eprintln!("[{}] {}", notification.title, notification.body)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = config::load_settings(&cli.config);
    if let Some(url) = cli.graphql_url {
        settings.graphql_url = url;
    }
    let store = FileSessionStore::new(&settings.session_file);

    match cli.command {
        Command::RoomTypes => {
            let token = store
                .get(TOKEN_KEY)?
                .filter(|token| !token.trim().is_empty());
            let client = settings.graphql_client(token)?;
            let page = match client.list_room_types(RoomTypesQuery::default()).await {
                Ok(page) => page,
                Err(err) => {
                    let code = err.downcast_ref::<GraphQlError>().and_then(GraphQlError::code);
                    if code == Some(ErrorCode::Unauthenticated) {
                        bail!("not signed in, run `booking session set --token ...`: {err:#}");
                    }
                    return Err(err);
                }
            };
            println!("{} room type(s)", page.count);
            for option in page.items.into_iter().map(RoomTypeOption::from) {
                println!("{}\t{}", option.id, option.display_name());
            }
        }
        Command::Book {
            hotel_id,
            room_type,
            start,
            end,
            persons,
        } => {
            let session = SessionContext::from_store(&store).with_context(|| {
                format!(
                    "no usable session in '{}'; run `booking session set` first",
                    store.path().display()
                )
            })?;
            book(
                &settings,
                session,
                HotelId::new(hotel_id),
                RoomTypeId::new(room_type),
                start,
                end,
                persons,
            )
            .await?;
        }
        Command::Session { command } => match command {
            SessionCommand::Show => match session::load_user(&store)? {
                Some(user) => {
                    println!("{}", serde_json::to_string_pretty(&user)?);
                    let has_token = store.get(TOKEN_KEY)?.is_some();
                    println!("token: {}", if has_token { "present" } else { "absent" });
                }
                None => println!("no session in '{}'", store.path().display()),
            },
            SessionCommand::Set {
                user_id,
                token,
                firstname,
                lastname,
            } => {
                session::save_user(
                    &store,
                    &SessionUser {
                        id: UserId::new(user_id),
                        firstname,
                        lastname,
                        image: None,
                    },
                )?;
                match token {
                    Some(token) => store.set(TOKEN_KEY, &token)?,
                    None => store.remove(TOKEN_KEY)?,
                }
                info!("session: saved to {}", store.path().display());
            }
            SessionCommand::Clear => {
                session::clear(&store)?;
                info!("session: cleared {}", store.path().display());
            }
        },
    }

    Ok(())
}

async fn book(
    settings: &config::Settings,
    session: SessionContext,
    hotel_id: HotelId,
    room_type: RoomTypeId,
    start: NaiveDate,
    end: NaiveDate,
    persons: u32,
) -> Result<()> {
    let client = Arc::new(settings.graphql_client(session.token.clone())?);
    let workflow = ReservationWorkflow::new_with_dependencies(
        hotel_id,
        session,
        WorkflowDependencies {
            catalog: client.clone(),
            reservations: client,
            navigation: Arc::new(ConsoleNavigator),
            notifier: Arc::new(ConsoleNotifier),
        },
        settings.workflow_options(),
    );

    let catalog = workflow.load_room_types().await;
    if let Some(message) = catalog.error() {
        warn!("booking: room types unavailable: {message}");
    } else if !catalog.options().iter().any(|option| option.id == room_type) {
        warn!("booking: room type {room_type} is not in the catalog");
    }

    workflow.select_room_type(room_type).await;
    workflow.set_date_range(DateAnchor::StartDate, start).await;
    workflow.set_date_range(DateAnchor::EndDate, end).await;
    let delta = i32::try_from(persons).unwrap_or(i32::MAX).saturating_sub(1);
    workflow.adjust_party_size(delta).await;

    let outcome = workflow.submit().await;
    workflow.dispose().await;

    match outcome {
        SubmitOutcome::Completed(SubmissionResult::Success { reservation }) => {
            println!(
                "reservation_id={} room_type={} {}..{} persons={}",
                reservation.id,
                reservation.hotel_room_type_id,
                reservation.start_date,
                reservation.end_date,
                reservation.nb_persons
            );
            Ok(())
        }
        SubmitOutcome::Completed(SubmissionResult::ValidationError { message }) => {
            bail!("reservation rejected: {message}")
        }
        SubmitOutcome::Completed(SubmissionResult::TransportFailure { cause }) => {
            bail!("reservation request failed: {cause}")
        }
        SubmitOutcome::Busy | SubmitOutcome::Closed => {
            bail!("reservation was not submitted")
        }
    }
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
