mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client_core::{
    stores::changelog_entries, ApplicationState, DragOutcome, ModalController, SidebarController,
    StorageServerEditor,
};
use permissions::{admin_mask, editor_permissions, is_admin_enabled, toggle_admin, PermissionValue};
use shared::{
    domain::{CategoryId, ChannelId, ServerId, UserId},
    protocol::{OverrideField, ServerSnapshot},
};
use sidebar::{Container, MoveIntent, OrderingState};
use storage::Storage;
use tracing::info;

use crate::config::{load_settings, normalize_database_url, Settings};

#[derive(Parser, Debug)]
#[command(name = "sidebar-tool", about = "Inspect and reorder server sidebars")]
struct Cli {
    /// Overrides the configured database url.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the administrator mask, or toggles it on a permission value.
    Admin {
        #[arg(long, conflicts_with_all = ["allow", "deny"])]
        value: Option<u64>,
        #[arg(long)]
        allow: Option<u64>,
        #[arg(long)]
        deny: Option<u64>,
        #[arg(long)]
        disable: bool,
    },
    #[command(flatten)]
    Sidebar(SidebarCommand),
}

/// Commands that need the database.
#[derive(Subcommand, Debug)]
enum SidebarCommand {
    /// Creates or replaces a server with an uncategorized channel list.
    Seed {
        server_id: String,
        name: String,
        #[arg(long)]
        owner: String,
        #[arg(long, value_delimiter = ',')]
        channels: Vec<String>,
        #[arg(long, default_value_t = 0)]
        permission: u64,
    },
    Show {
        server_id: String,
    },
    /// Replays a channel drag; containers are droppable ids
    /// (`uncategorized` or a category id).
    MoveChannel {
        server_id: String,
        channel_id: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        from_index: usize,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        to_index: usize,
    },
    MoveCategory {
        server_id: String,
        category_id: String,
        #[arg(long)]
        from_index: usize,
        #[arg(long)]
        to_index: usize,
    },
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },
    /// Shows the changelog if a recent entry has not been seen.
    Changelog,
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    Create {
        server_id: String,
        title: String,
    },
    Rename {
        server_id: String,
        category_id: String,
        title: String,
    },
    Delete {
        server_id: String,
        category_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings();
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    match cli.command {
        Command::Admin {
            value,
            allow,
            deny,
            disable,
        } => {
            print_admin(value, allow, deny, disable);
            Ok(())
        }
        Command::Sidebar(command) => {
            let database_url = normalize_database_url(
                cli.database_url.as_deref().unwrap_or(&settings.database_url),
            );
            let storage = Storage::new(&database_url)
                .await
                .with_context(|| format!("failed to open database at '{database_url}'"))?;
            run(command, &storage, &settings).await
        }
    }
}

async fn run(command: SidebarCommand, storage: &Storage, settings: &Settings) -> Result<()> {
    match command {
        SidebarCommand::Seed {
            server_id,
            name,
            owner,
            channels,
            permission,
        } => {
            let snapshot = ServerSnapshot {
                server_id: ServerId::new(server_id),
                name,
                owner: UserId::new(owner),
                permission,
                channel_ids: channels.into_iter().map(ChannelId::from).collect(),
                categories: Vec::new(),
                updated_at: None,
            };
            storage.upsert_server(&snapshot).await?;
            info!(server_id = %snapshot.server_id, channels = snapshot.channel_ids.len(), "server seeded");
            println!("seeded server_id={}", snapshot.server_id);
        }
        SidebarCommand::Show { server_id } => {
            let controller = controller_for(storage, settings, &server_id).await?;
            print_sidebar(&controller.state().await);
            println!("can_reorder={}", controller.can_reorder().await);
        }
        SidebarCommand::MoveChannel {
            server_id,
            channel_id,
            from,
            from_index,
            to,
            to_index,
        } => {
            let controller = controller_for(storage, settings, &server_id).await?;
            let intent = MoveIntent::channel(
                channel_id,
                Container::from_droppable_id(&from),
                from_index,
                to.as_deref().map(Container::from_droppable_id),
                to_index,
            );
            report(controller.handle_drag_end(intent).await?);
        }
        SidebarCommand::MoveCategory {
            server_id,
            category_id,
            from_index,
            to_index,
        } => {
            let controller = controller_for(storage, settings, &server_id).await?;
            let intent = MoveIntent::category(category_id, from_index, to_index);
            report(controller.handle_drag_end(intent).await?);
        }
        SidebarCommand::Category { action } => match action {
            CategoryCommand::Create { server_id, title } => {
                let controller = controller_for(storage, settings, &server_id).await?;
                let id = controller.create_category(&title).await?;
                println!("created category_id={id}");
            }
            CategoryCommand::Rename {
                server_id,
                category_id,
                title,
            } => {
                let controller = controller_for(storage, settings, &server_id).await?;
                controller
                    .rename_category(&CategoryId::new(category_id), &title)
                    .await?;
                print_sidebar(&controller.state().await);
            }
            CategoryCommand::Delete {
                server_id,
                category_id,
            } => {
                let controller = controller_for(storage, settings, &server_id).await?;
                controller
                    .delete_category(&CategoryId::new(category_id))
                    .await?;
                print_sidebar(&controller.state().await);
            }
        },
        SidebarCommand::Changelog => {
            let state = ApplicationState::new();
            state.hydrate(storage).await?;
            let modals = ModalController::new();
            let opened = state
                .check_for_updates(&changelog_entries(), Utc::now(), &modals)
                .await;
            state.persist(storage).await?;
            match modals.active().await {
                Some(modal) if opened => println!("open {modal:?}"),
                _ => println!("changelog up to date"),
            }
        }
    }

    Ok(())
}

async fn controller_for(
    storage: &Storage,
    settings: &Settings,
    server_id: &str,
) -> Result<Arc<SidebarController>> {
    let server_id = ServerId::new(server_id);
    let snapshot = storage
        .load_server(&server_id)
        .await?
        .with_context(|| format!("server {server_id} not found"))?;
    let mut editor = StorageServerEditor::new(storage.clone());
    if let Some(user_id) = &settings.user_id {
        editor = editor.with_actor(user_id.clone());
    }
    Ok(SidebarController::new(
        &snapshot,
        settings.user_id.clone(),
        Arc::new(editor),
    ))
}

fn report(outcome: DragOutcome) {
    match outcome {
        DragOutcome::Unchanged => println!("nothing to save"),
        DragOutcome::Saved(state) => print_sidebar(&state),
    }
}

fn print_sidebar(state: &OrderingState) {
    for channel in state.uncategorized() {
        println!("  #{channel}");
    }
    for category in &state.categories {
        println!("{} [{}]", category.title, category.id);
        for channel in &category.channels {
            println!("  #{channel}");
        }
    }
}

fn print_admin(value: Option<u64>, allow: Option<u64>, deny: Option<u64>, disable: bool) {
    let mask = admin_mask();
    let value = match (value, allow, deny) {
        (Some(bits), _, _) => PermissionValue::Plain(bits),
        (None, None, None) => {
            println!("admin_mask={mask:#x}");
            for permission in editor_permissions(None) {
                println!("  {:<24} {:#x}", permission.name(), permission.bits());
            }
            return;
        }
        (None, allow, deny) => PermissionValue::Override(OverrideField::new(
            allow.unwrap_or_default(),
            deny.unwrap_or_default(),
        )),
    };

    let toggled = toggle_admin(value, mask, !disable);
    println!(
        "admin before={} after={}",
        is_admin_enabled(value, mask),
        is_admin_enabled(toggled, mask)
    );
    match toggled {
        PermissionValue::Plain(bits) => println!("value={bits}"),
        PermissionValue::Override(field) => println!("allow={} deny={}", field.allow, field.deny),
    }
}
