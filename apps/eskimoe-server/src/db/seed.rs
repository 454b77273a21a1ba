use chrono::Utc;

use super::store::{EntityStore, OrderKey, StoreResult};
use crate::config::Config;
use crate::models::category::NewCategory;
use crate::models::ordered_ids::OrderedIds;
use crate::models::reaction::NewServerReaction;
use crate::models::role::NewRole;
use crate::models::room::{NewRoom, RoomType};
use crate::models::server::ServerSettings;
use crate::permissions::default_everyone;

const DEFAULT_REACTIONS: [(&str, &str); 4] = [
    ("👍", "#3ba55c"),
    ("❤️", "#ed4245"),
    ("😂", "#faa61a"),
    ("🎉", "#5865f2"),
];

/// Creates the server record and its starter content on first run. On
/// later runs only the configured name, message and admission mode are
/// applied to the existing record.
pub async fn ensure_server(store: &dyn EntityStore, config: &Config) -> StoreResult<ServerSettings> {
    if let Some(mut server) = store.load_server().await? {
        server.name = config.name.clone();
        server.message = config.message.clone();
        server.mode = config.mode;
        server.passphrase = config.passphrase.clone();
        store.save_server(&server).await?;
        tracing::info!(name = %server.name, mode = %server.mode, "server settings refreshed");
        return Ok(server);
    }

    let everyone = match store.default_role().await? {
        Some(role) => role,
        None => {
            store
                .create_role(NewRole {
                    name: "Everyone".to_string(),
                    permissions: default_everyone(),
                    system_role: true,
                })
                .await?
        }
    };

    let general = store
        .create_category(NewCategory {
            name: "General".to_string(),
        })
        .await?;
    let chat = store
        .create_room(NewRoom {
            name: "Chat".to_string(),
            description: "General chat room".to_string(),
            room_type: RoomType::Text,
            category_id: general.id,
        })
        .await?;
    store
        .link_ordered(
            OrderKey::Rooms {
                category_id: general.id,
            },
            chat.id,
            None,
        )
        .await?;

    for (reaction, color) in DEFAULT_REACTIONS {
        store
            .create_server_reaction(NewServerReaction {
                reaction: reaction.to_string(),
                color: color.to_string(),
            })
            .await?;
    }

    let server = ServerSettings {
        name: config.name.clone(),
        message: config.message.clone(),
        mode: config.mode,
        passphrase: config.passphrase.clone(),
        category_order: OrderedIds::from(vec![general.id]),
        role_order: OrderedIds::from(vec![everyone.id]),
        created_at: Utc::now(),
    };
    store.save_server(&server).await?;

    tracing::info!(
        name = %server.name,
        everyone_role = everyone.id,
        category = general.id,
        room = chat.id,
        "server initialised"
    );

    Ok(server)
}
