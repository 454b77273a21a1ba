//! PostgreSQL implementation of [`EntityStore`] on diesel-async.
//!
//! Diesel row structs live here and are converted into the domain models at
//! the boundary, so enum and bitset columns are parsed in one place.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError, OptionalExtension};
use diesel_async::pooled_connection::deadpool::{Object, PoolError};
use diesel_async::{AsyncConnection, AsyncPgConnection};
use scoped_futures::ScopedFutureExt;

use super::pool::DbPool;
use super::schema::{
    categories, invites, members, message_reactions, messages, roles, rooms, server_logs,
    server_reactions, servers,
};
use super::store::{
    EntityStore, OrderKey, ReactionAdded, ReactionRemoved, StoreError, StoreResult,
};
use crate::models::category::{Category, NewCategory};
use crate::models::invite::{Invite, NewInvite};
use crate::models::log::{LogEntry, NewLogEntry};
use crate::models::member::{Member, NewMember};
use crate::models::message::{Message, NewMessage};
use crate::models::ordered_ids::{OrderedIds, ReorderError};
use crate::models::reaction::{MessageReaction, NewServerReaction, ServerReaction};
use crate::models::role::{NewRole, Role};
use crate::models::room::{NewRoom, Room};
use crate::models::server::ServerSettings;
use crate::permissions::Permissions;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound("record"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        StoreError::Backend(format!("connection pool: {err}"))
    }
}

fn parse_column<T: FromStr<Err = String>>(raw: &str) -> StoreResult<T> {
    raw.parse().map_err(StoreError::Backend)
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Queryable, Selectable)]
#[diesel(table_name = servers, check_for_backend(diesel::pg::Pg))]
struct ServerRow {
    #[allow(dead_code)]
    id: i32,
    name: String,
    message: String,
    mode: String,
    passphrase: Option<String>,
    category_order: Vec<i32>,
    role_order: Vec<i32>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ServerRow> for ServerSettings {
    type Error = StoreError;

    fn try_from(row: ServerRow) -> StoreResult<Self> {
        Ok(Self {
            name: row.name,
            message: row.message,
            mode: parse_column(&row.mode)?,
            passphrase: row.passphrase,
            category_order: row.category_order.into(),
            role_order: row.role_order.into(),
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = servers, treat_none_as_null = true)]
struct ServerRecord<'a> {
    name: &'a str,
    message: &'a str,
    mode: &'a str,
    passphrase: Option<&'a str>,
    category_order: Vec<i32>,
    role_order: Vec<i32>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = members, check_for_backend(diesel::pg::Pg))]
struct MemberRow {
    id: i32,
    unique_id: String,
    token_hash: Option<String>,
    display_name: String,
    about: String,
    pronouns: String,
    status: String,
    role_ids: Vec<i32>,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = StoreError;

    fn try_from(row: MemberRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            unique_id: row.unique_id,
            token_hash: row.token_hash,
            display_name: row.display_name,
            about: row.about,
            pronouns: row.pronouns,
            status: parse_column(&row.status)?,
            role_ids: row.role_ids,
            joined_at: row.joined_at,
        })
    }
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = members, treat_none_as_null = true)]
struct MemberRecord<'a> {
    unique_id: &'a str,
    token_hash: Option<&'a str>,
    display_name: &'a str,
    about: &'a str,
    pronouns: &'a str,
    status: &'a str,
    role_ids: Vec<i32>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = roles, check_for_backend(diesel::pg::Pg))]
struct RoleRow {
    id: i32,
    name: String,
    permissions: i64,
    system_role: bool,
    created_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            permissions: Permissions::from_bits_truncate(row.permissions as u32),
            system_role: row.system_role,
            created_at: row.created_at,
        }
    }
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = roles)]
struct RoleRecord<'a> {
    name: &'a str,
    permissions: i64,
    system_role: bool,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = categories, check_for_backend(diesel::pg::Pg))]
struct CategoryRow {
    id: i32,
    name: String,
    room_order: Vec<i32>,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            room_order: row.room_order.into(),
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = rooms, check_for_backend(diesel::pg::Pg))]
struct RoomRow {
    id: i32,
    name: String,
    description: String,
    room_type: String,
    category_id: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<RoomRow> for Room {
    type Error = StoreError;

    fn try_from(row: RoomRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            room_type: parse_column(&row.room_type)?,
            category_id: row.category_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = rooms)]
struct RoomRecord<'a> {
    name: &'a str,
    description: &'a str,
    room_type: &'a str,
    category_id: i32,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = messages, check_for_backend(diesel::pg::Pg))]
struct MessageRow {
    id: i32,
    content: String,
    author_id: i32,
    room_id: i32,
    edited: bool,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            author_id: row.author_id,
            room_id: row.room_id,
            edited: row.edited,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = server_reactions, check_for_backend(diesel::pg::Pg))]
struct ServerReactionRow {
    id: i32,
    reaction: String,
    color: String,
    created_at: DateTime<Utc>,
}

impl From<ServerReactionRow> for ServerReaction {
    fn from(row: ServerReactionRow) -> Self {
        Self {
            id: row.id,
            reaction: row.reaction,
            color: row.color,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = message_reactions, check_for_backend(diesel::pg::Pg))]
struct MessageReactionRow {
    id: i32,
    message_id: i32,
    reaction_id: i32,
    member_ids: Vec<i32>,
    member_count: i32,
}

impl From<MessageReactionRow> for MessageReaction {
    fn from(row: MessageReactionRow) -> Self {
        Self {
            id: row.id,
            message_id: row.message_id,
            reaction_id: row.reaction_id,
            member_ids: row.member_ids,
            count: row.member_count,
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = invites, check_for_backend(diesel::pg::Pg))]
struct InviteRow {
    id: i32,
    code: String,
    used: bool,
    generated_by: i32,
    used_by: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<InviteRow> for Invite {
    fn from(row: InviteRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            used: row.used,
            generated_by: row.generated_by,
            used_by: row.used_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = server_logs, check_for_backend(diesel::pg::Pg))]
struct LogRow {
    id: i32,
    log_type: String,
    content: String,
    member_id: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = StoreError;

    fn try_from(row: LogRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            log_type: parse_column(&row.log_type)?,
            content: row.content,
            member_id: row.member_id,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Escapes LIKE wildcards so the value matches literally.
fn like_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ---------------------------------------------------------------------------
// Ordering arrays
// ---------------------------------------------------------------------------

/// Reads an ordering array and holds a row lock on its owner until the
/// surrounding transaction ends.
async fn lock_order(conn: &mut AsyncPgConnection, key: OrderKey) -> StoreResult<OrderedIds> {
    let ids: Option<Vec<i32>> = match key {
        OrderKey::Categories => diesel_async::RunQueryDsl::get_result(
            servers::table
                .order(servers::id.asc())
                .limit(1)
                .select(servers::category_order)
                .for_update(),
            conn,
        )
        .await
        .optional()?,
        OrderKey::Roles => diesel_async::RunQueryDsl::get_result(
            servers::table
                .order(servers::id.asc())
                .limit(1)
                .select(servers::role_order)
                .for_update(),
            conn,
        )
        .await
        .optional()?,
        OrderKey::Rooms { category_id } => diesel_async::RunQueryDsl::get_result(
            categories::table
                .find(category_id)
                .select(categories::room_order)
                .for_update(),
            conn,
        )
        .await
        .optional()?,
    };
    ids.map(OrderedIds::from)
        .ok_or(StoreError::NotFound(key.owner()))
}

async fn write_order(
    conn: &mut AsyncPgConnection,
    key: OrderKey,
    order: &OrderedIds,
) -> StoreResult<()> {
    let ids = order.as_slice().to_vec();
    let updated = match key {
        OrderKey::Categories => {
            diesel_async::RunQueryDsl::execute(
                diesel::update(servers::table).set(servers::category_order.eq(ids)),
                conn,
            )
            .await?
        }
        OrderKey::Roles => {
            diesel_async::RunQueryDsl::execute(
                diesel::update(servers::table).set(servers::role_order.eq(ids)),
                conn,
            )
            .await?
        }
        OrderKey::Rooms { category_id } => {
            diesel_async::RunQueryDsl::execute(
                diesel::update(categories::table.find(category_id))
                    .set(categories::room_order.eq(ids)),
                conn,
            )
            .await?
        }
    };
    if updated == 0 {
        return Err(StoreError::NotFound(key.owner()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> StoreResult<Object<AsyncPgConnection>> {
        Ok(self.pool.get().await?)
    }

    /// Applies `change` to one ordering array inside a transaction that
    /// holds the owner's row lock.
    async fn modify_order<T, F>(&self, key: OrderKey, change: F) -> StoreResult<T>
    where
        T: Send,
        F: FnOnce(&mut OrderedIds) -> T + Send,
    {
        let mut conn = self.conn().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let mut order = lock_order(conn, key).await?;
                let outcome = change(&mut order);
                write_order(conn, key, &order).await?;
                Ok(outcome)
            }
            .scope_boxed()
        })
        .await
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn load_server(&self) -> StoreResult<Option<ServerSettings>> {
        let mut conn = self.conn().await?;
        let row: Option<ServerRow> = diesel_async::RunQueryDsl::get_result(
            servers::table
                .order(servers::id.asc())
                .limit(1)
                .select(ServerRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(ServerSettings::try_from).transpose()
    }

    async fn save_server(&self, server: &ServerSettings) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let record = ServerRecord {
            name: &server.name,
            message: &server.message,
            mode: server.mode.as_str(),
            passphrase: server.passphrase.as_deref(),
            category_order: server.category_order.as_slice().to_vec(),
            role_order: server.role_order.as_slice().to_vec(),
        };

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let existing: Option<i32> = diesel_async::RunQueryDsl::get_result(
                    servers::table
                        .order(servers::id.asc())
                        .limit(1)
                        .select(servers::id),
                    conn,
                )
                .await
                .optional()?;

                match existing {
                    Some(id) => {
                        diesel_async::RunQueryDsl::execute(
                            diesel::update(servers::table.find(id)).set(&record),
                            conn,
                        )
                        .await?;
                    }
                    None => {
                        diesel_async::RunQueryDsl::execute(
                            diesel::insert_into(servers::table).values(&record),
                            conn,
                        )
                        .await?;
                    }
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    // -- ordering -----------------------------------------------------------

    async fn link_ordered(&self, key: OrderKey, id: i32, position: Option<usize>) -> StoreResult<()> {
        self.modify_order(key, move |order| {
            match position {
                Some(index) => order.insert(index, id),
                None => order.push(id),
            };
        })
        .await
    }

    async fn unlink_ordered(&self, key: OrderKey, id: i32) -> StoreResult<Option<usize>> {
        self.modify_order(key, move |order| {
            let position = order.position(id);
            order.remove(id);
            position
        })
        .await
    }

    async fn reorder(
        &self,
        key: OrderKey,
        proposed: Vec<i32>,
    ) -> StoreResult<Result<OrderedIds, ReorderError>> {
        self.modify_order(key, move |order| {
            order.reorder(proposed).map(|next| {
                *order = next.clone();
                next
            })
        })
        .await
    }

    // -- members ------------------------------------------------------------

    async fn member(&self, id: i32) -> StoreResult<Option<Member>> {
        let mut conn = self.conn().await?;
        let row: Option<MemberRow> = diesel_async::RunQueryDsl::get_result(
            members::table.find(id).select(MemberRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Member::try_from).transpose()
    }

    async fn member_by_unique_id(&self, unique_id: &str) -> StoreResult<Option<Member>> {
        let mut conn = self.conn().await?;
        let row: Option<MemberRow> = diesel_async::RunQueryDsl::get_result(
            members::table
                .filter(members::unique_id.eq(unique_id))
                .select(MemberRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Member::try_from).transpose()
    }

    async fn member_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Member>> {
        let mut conn = self.conn().await?;
        let row: Option<MemberRow> = diesel_async::RunQueryDsl::get_result(
            members::table
                .filter(members::token_hash.eq(token_hash))
                .select(MemberRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Member::try_from).transpose()
    }

    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        let mut conn = self.conn().await?;
        let rows: Vec<MemberRow> = diesel_async::RunQueryDsl::load(
            members::table
                .order(members::id.asc())
                .select(MemberRow::as_select()),
            &mut conn,
        )
        .await?;
        convert_all(rows)
    }

    async fn create_member(&self, new: NewMember) -> StoreResult<Member> {
        let mut conn = self.conn().await?;
        let row: MemberRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(members::table)
                .values(MemberRecord {
                    unique_id: &new.unique_id,
                    token_hash: Some(&new.token_hash),
                    display_name: &new.display_name,
                    about: "",
                    pronouns: "",
                    status: "online",
                    role_ids: new.role_ids.clone(),
                })
                .returning(MemberRow::as_returning()),
            &mut conn,
        )
        .await?;
        Member::try_from(row)
    }

    async fn update_member(&self, member: &Member) -> StoreResult<Member> {
        let mut conn = self.conn().await?;
        let row: Option<MemberRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(members::table.find(member.id))
                .set(MemberRecord {
                    unique_id: &member.unique_id,
                    token_hash: member.token_hash.as_deref(),
                    display_name: &member.display_name,
                    about: &member.about,
                    pronouns: &member.pronouns,
                    status: member.status.as_str(),
                    role_ids: member.role_ids.clone(),
                })
                .returning(MemberRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.ok_or(StoreError::NotFound("member"))
            .and_then(Member::try_from)
    }

    // -- roles --------------------------------------------------------------

    async fn role(&self, id: i32) -> StoreResult<Option<Role>> {
        let mut conn = self.conn().await?;
        let row: Option<RoleRow> = diesel_async::RunQueryDsl::get_result(
            roles::table.find(id).select(RoleRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(row.map(Role::from))
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let mut conn = self.conn().await?;
        let row: Option<RoleRow> = diesel_async::RunQueryDsl::get_result(
            roles::table
                .filter(roles::name.ilike(like_literal(name)))
                .limit(1)
                .select(RoleRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(row.map(Role::from))
    }

    async fn default_role(&self) -> StoreResult<Option<Role>> {
        let mut conn = self.conn().await?;
        let row: Option<RoleRow> = diesel_async::RunQueryDsl::get_result(
            roles::table
                .filter(roles::system_role.eq(true))
                .order(roles::id.asc())
                .limit(1)
                .select(RoleRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(row.map(Role::from))
    }

    async fn roles_by_ids(&self, ids: &[i32]) -> StoreResult<Vec<Role>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let rows: Vec<RoleRow> = diesel_async::RunQueryDsl::load(
            roles::table
                .filter(roles::id.eq_any(ids.to_vec()))
                .order(roles::id.asc())
                .select(RoleRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let mut conn = self.conn().await?;
        let rows: Vec<RoleRow> = diesel_async::RunQueryDsl::load(
            roles::table.order(roles::id.asc()).select(RoleRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn create_role(&self, new: NewRole) -> StoreResult<Role> {
        let mut conn = self.conn().await?;
        let row: RoleRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(roles::table)
                .values(RoleRecord {
                    name: &new.name,
                    permissions: i64::from(new.permissions.bits()),
                    system_role: new.system_role,
                })
                .returning(RoleRow::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(row.into())
    }

    async fn update_role(&self, role: &Role) -> StoreResult<Role> {
        let mut conn = self.conn().await?;
        let row: Option<RoleRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(roles::table.find(role.id))
                .set(RoleRecord {
                    name: &role.name,
                    permissions: i64::from(role.permissions.bits()),
                    system_role: role.system_role,
                })
                .returning(RoleRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Role::from).ok_or(StoreError::NotFound("role"))
    }

    async fn delete_role(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn().await?;

        // Strip the role from every holder and drop it atomically.
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let holders: Vec<(i32, Vec<i32>)> = diesel_async::RunQueryDsl::load(
                    members::table.select((members::id, members::role_ids)),
                    conn,
                )
                .await?;

                for (member_id, role_ids) in holders {
                    if !role_ids.contains(&id) {
                        continue;
                    }
                    let remaining: Vec<i32> =
                        role_ids.into_iter().filter(|role_id| *role_id != id).collect();
                    diesel_async::RunQueryDsl::execute(
                        diesel::update(members::table.find(member_id))
                            .set(members::role_ids.eq(remaining)),
                        conn,
                    )
                    .await?;
                }

                let deleted = diesel_async::RunQueryDsl::execute(
                    diesel::delete(roles::table.find(id)),
                    conn,
                )
                .await?;
                if deleted == 0 {
                    return Err(StoreError::NotFound("role"));
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    // -- categories ---------------------------------------------------------

    async fn category(&self, id: i32) -> StoreResult<Option<Category>> {
        let mut conn = self.conn().await?;
        let row: Option<CategoryRow> = diesel_async::RunQueryDsl::get_result(
            categories::table.find(id).select(CategoryRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(row.map(Category::from))
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut conn = self.conn().await?;
        let rows: Vec<CategoryRow> = diesel_async::RunQueryDsl::load(
            categories::table
                .order(categories::id.asc())
                .select(CategoryRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn create_category(&self, new: NewCategory) -> StoreResult<Category> {
        let mut conn = self.conn().await?;
        let row: CategoryRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(categories::table)
                .values(categories::name.eq(&new.name))
                .returning(CategoryRow::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(row.into())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<Category> {
        let mut conn = self.conn().await?;
        let row: Option<CategoryRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(categories::table.find(category.id))
                .set(categories::name.eq(&category.name))
                .returning(CategoryRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Category::from).ok_or(StoreError::NotFound("category"))
    }

    async fn delete_category(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let remaining_rooms: i64 = diesel_async::RunQueryDsl::get_result(
                    rooms::table.filter(rooms::category_id.eq(id)).count(),
                    conn,
                )
                .await?;
                if remaining_rooms > 0 {
                    return Err(StoreError::Conflict("category still contains rooms".into()));
                }
                let deleted = diesel_async::RunQueryDsl::execute(
                    diesel::delete(categories::table.find(id)),
                    conn,
                )
                .await?;
                if deleted == 0 {
                    return Err(StoreError::NotFound("category"));
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    // -- rooms --------------------------------------------------------------

    async fn room(&self, id: i32) -> StoreResult<Option<Room>> {
        let mut conn = self.conn().await?;
        let row: Option<RoomRow> = diesel_async::RunQueryDsl::get_result(
            rooms::table.find(id).select(RoomRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Room::try_from).transpose()
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let mut conn = self.conn().await?;
        let rows: Vec<RoomRow> = diesel_async::RunQueryDsl::load(
            rooms::table.order(rooms::id.asc()).select(RoomRow::as_select()),
            &mut conn,
        )
        .await?;
        convert_all(rows)
    }

    async fn create_room(&self, new: NewRoom) -> StoreResult<Room> {
        let mut conn = self.conn().await?;
        let row: RoomRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(rooms::table)
                .values(RoomRecord {
                    name: &new.name,
                    description: &new.description,
                    room_type: new.room_type.as_str(),
                    category_id: new.category_id,
                })
                .returning(RoomRow::as_returning()),
            &mut conn,
        )
        .await?;
        Room::try_from(row)
    }

    async fn update_room(&self, room: &Room) -> StoreResult<Room> {
        let mut conn = self.conn().await?;
        let row: Option<RoomRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(rooms::table.find(room.id))
                .set(RoomRecord {
                    name: &room.name,
                    description: &room.description,
                    room_type: room.room_type.as_str(),
                    category_id: room.category_id,
                })
                .returning(RoomRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.ok_or(StoreError::NotFound("room")).and_then(Room::try_from)
    }

    async fn delete_room(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        // Messages and their reactions cascade.
        let deleted =
            diesel_async::RunQueryDsl::execute(diesel::delete(rooms::table.find(id)), &mut conn)
                .await?;
        if deleted == 0 {
            return Err(StoreError::NotFound("room"));
        }
        Ok(())
    }

    // -- messages -----------------------------------------------------------

    async fn message(&self, id: i32) -> StoreResult<Option<Message>> {
        let mut conn = self.conn().await?;
        let row: Option<MessageRow> = diesel_async::RunQueryDsl::get_result(
            messages::table.find(id).select(MessageRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(row.map(Message::from))
    }

    async fn recent_messages(&self, room_id: i32, limit: i64) -> StoreResult<Vec<Message>> {
        let mut conn = self.conn().await?;
        let rows: Vec<MessageRow> = diesel_async::RunQueryDsl::load(
            messages::table
                .filter(messages::room_id.eq(room_id))
                .order(messages::id.desc())
                .limit(limit)
                .select(MessageRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().rev().map(Message::from).collect())
    }

    async fn create_message(&self, new: NewMessage) -> StoreResult<Message> {
        let mut conn = self.conn().await?;
        let row: MessageRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(messages::table)
                .values((
                    messages::content.eq(&new.content),
                    messages::author_id.eq(new.author_id),
                    messages::room_id.eq(new.room_id),
                ))
                .returning(MessageRow::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(row.into())
    }

    async fn update_message(&self, message: &Message) -> StoreResult<Message> {
        let mut conn = self.conn().await?;
        let row: Option<MessageRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(messages::table.find(message.id))
                .set((
                    messages::content.eq(&message.content),
                    messages::edited.eq(message.edited),
                ))
                .returning(MessageRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Message::from).ok_or(StoreError::NotFound("message"))
    }

    async fn delete_message(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(messages::table.find(id)),
            &mut conn,
        )
        .await?;
        if deleted == 0 {
            return Err(StoreError::NotFound("message"));
        }
        Ok(())
    }

    async fn delete_messages(&self, room_id: i32, ids: &[i32]) -> StoreResult<Vec<i32>> {
        let mut conn = self.conn().await?;
        let mut deleted: Vec<i32> = diesel_async::RunQueryDsl::get_results(
            diesel::delete(
                messages::table
                    .filter(messages::room_id.eq(room_id))
                    .filter(messages::id.eq_any(ids.to_vec())),
            )
            .returning(messages::id),
            &mut conn,
        )
        .await?;
        deleted.sort_unstable();
        Ok(deleted)
    }

    // -- reactions ----------------------------------------------------------

    async fn server_reaction(&self, id: i32) -> StoreResult<Option<ServerReaction>> {
        let mut conn = self.conn().await?;
        let row: Option<ServerReactionRow> = diesel_async::RunQueryDsl::get_result(
            server_reactions::table
                .find(id)
                .select(ServerReactionRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(row.map(ServerReaction::from))
    }

    async fn list_server_reactions(&self) -> StoreResult<Vec<ServerReaction>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ServerReactionRow> = diesel_async::RunQueryDsl::load(
            server_reactions::table
                .order(server_reactions::id.asc())
                .select(ServerReactionRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(ServerReaction::from).collect())
    }

    async fn create_server_reaction(&self, new: NewServerReaction) -> StoreResult<ServerReaction> {
        let mut conn = self.conn().await?;
        let row: ServerReactionRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(server_reactions::table)
                .values((
                    server_reactions::reaction.eq(&new.reaction),
                    server_reactions::color.eq(&new.color),
                ))
                .returning(ServerReactionRow::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(row.into())
    }

    async fn message_reaction(
        &self,
        message_id: i32,
        reaction_id: i32,
    ) -> StoreResult<Option<MessageReaction>> {
        let mut conn = self.conn().await?;
        let row: Option<MessageReactionRow> = diesel_async::RunQueryDsl::get_result(
            message_reactions::table
                .filter(message_reactions::message_id.eq(message_id))
                .filter(message_reactions::reaction_id.eq(reaction_id))
                .select(MessageReactionRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(row.map(MessageReaction::from))
    }

    async fn reactions_for_messages(&self, message_ids: &[i32]) -> StoreResult<Vec<MessageReaction>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let rows: Vec<MessageReactionRow> = diesel_async::RunQueryDsl::load(
            message_reactions::table
                .filter(message_reactions::message_id.eq_any(message_ids.to_vec()))
                .order(message_reactions::id.asc())
                .select(MessageReactionRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(MessageReaction::from).collect())
    }

    async fn add_reaction_member(
        &self,
        message_id: i32,
        reaction_id: i32,
        member_id: i32,
    ) -> StoreResult<ReactionAdded> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                // A concurrent last-member removal can delete the row between
                // the insert and the locking read, so try again.
                for _ in 0..3 {
                    let created: Option<MessageReactionRow> = diesel_async::RunQueryDsl::get_result(
                        diesel::insert_into(message_reactions::table)
                            .values((
                                message_reactions::message_id.eq(message_id),
                                message_reactions::reaction_id.eq(reaction_id),
                                message_reactions::member_ids.eq(vec![member_id]),
                                message_reactions::member_count.eq(1),
                            ))
                            .on_conflict((message_reactions::message_id, message_reactions::reaction_id))
                            .do_nothing()
                            .returning(MessageReactionRow::as_returning()),
                        conn,
                    )
                    .await
                    .optional()?;
                    if let Some(row) = created {
                        return Ok(ReactionAdded::Created(row.into()));
                    }

                    let locked: Option<MessageReactionRow> = diesel_async::RunQueryDsl::get_result(
                        message_reactions::table
                            .filter(message_reactions::message_id.eq(message_id))
                            .filter(message_reactions::reaction_id.eq(reaction_id))
                            .select(MessageReactionRow::as_select())
                            .for_update(),
                        conn,
                    )
                    .await
                    .optional()?;
                    let Some(row) = locked else { continue };

                    let mut reaction = MessageReaction::from(row);
                    if !reaction.add_member(member_id) {
                        return Ok(ReactionAdded::AlreadyPresent(reaction));
                    }
                    let row: MessageReactionRow = diesel_async::RunQueryDsl::get_result(
                        diesel::update(message_reactions::table.find(reaction.id))
                            .set((
                                message_reactions::member_ids.eq(reaction.member_ids.clone()),
                                message_reactions::member_count.eq(reaction.count),
                            ))
                            .returning(MessageReactionRow::as_returning()),
                        conn,
                    )
                    .await?;
                    return Ok(ReactionAdded::Joined(row.into()));
                }
                Err(StoreError::Conflict("reaction changed concurrently".into()))
            }
            .scope_boxed()
        })
        .await
    }

    async fn remove_reaction_member(
        &self,
        message_id: i32,
        reaction_id: i32,
        member_id: i32,
    ) -> StoreResult<ReactionRemoved> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let locked: Option<MessageReactionRow> = diesel_async::RunQueryDsl::get_result(
                    message_reactions::table
                        .filter(message_reactions::message_id.eq(message_id))
                        .filter(message_reactions::reaction_id.eq(reaction_id))
                        .select(MessageReactionRow::as_select())
                        .for_update(),
                    conn,
                )
                .await
                .optional()?;
                let Some(row) = locked else {
                    return Ok(ReactionRemoved::NotReacted);
                };

                let mut reaction = MessageReaction::from(row);
                if !reaction.remove_member(member_id) {
                    return Ok(ReactionRemoved::NotReacted);
                }
                if reaction.member_ids.is_empty() {
                    diesel_async::RunQueryDsl::execute(
                        diesel::delete(message_reactions::table.find(reaction.id)),
                        conn,
                    )
                    .await?;
                    return Ok(ReactionRemoved::Deleted(reaction));
                }
                let row: MessageReactionRow = diesel_async::RunQueryDsl::get_result(
                    diesel::update(message_reactions::table.find(reaction.id))
                        .set((
                            message_reactions::member_ids.eq(reaction.member_ids.clone()),
                            message_reactions::member_count.eq(reaction.count),
                        ))
                        .returning(MessageReactionRow::as_returning()),
                    conn,
                )
                .await?;
                Ok(ReactionRemoved::Left(row.into()))
            }
            .scope_boxed()
        })
        .await
    }

    // -- invites ------------------------------------------------------------

    async fn invite_by_code(&self, code: &str) -> StoreResult<Option<Invite>> {
        let mut conn = self.conn().await?;
        let row: Option<InviteRow> = diesel_async::RunQueryDsl::get_result(
            invites::table
                .filter(invites::code.eq(code))
                .select(InviteRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(row.map(Invite::from))
    }

    async fn list_invites(&self) -> StoreResult<Vec<Invite>> {
        let mut conn = self.conn().await?;
        let rows: Vec<InviteRow> = diesel_async::RunQueryDsl::load(
            invites::table
                .order(invites::id.asc())
                .select(InviteRow::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(Invite::from).collect())
    }

    async fn create_invite(&self, new: NewInvite) -> StoreResult<Invite> {
        let mut conn = self.conn().await?;
        let row: InviteRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(invites::table)
                .values((
                    invites::code.eq(&new.code),
                    invites::generated_by.eq(new.generated_by),
                ))
                .returning(InviteRow::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(row.into())
    }

    async fn update_invite(&self, invite: &Invite) -> StoreResult<Invite> {
        let mut conn = self.conn().await?;
        let row: Option<InviteRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(invites::table.find(invite.id))
                .set((
                    invites::used.eq(invite.used),
                    invites::used_by.eq(invite.used_by),
                ))
                .returning(InviteRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Invite::from).ok_or(StoreError::NotFound("invite"))
    }

    async fn delete_invite(&self, id: i32) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(invites::table.find(id)),
            &mut conn,
        )
        .await?;
        if deleted == 0 {
            return Err(StoreError::NotFound("invite"));
        }
        Ok(())
    }

    // -- logs ---------------------------------------------------------------

    async fn append_log(&self, new: NewLogEntry) -> StoreResult<LogEntry> {
        let mut conn = self.conn().await?;
        let row: LogRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(server_logs::table)
                .values((
                    server_logs::log_type.eq(new.log_type.as_str()),
                    server_logs::content.eq(&new.content),
                    server_logs::member_id.eq(new.member_id),
                ))
                .returning(LogRow::as_returning()),
            &mut conn,
        )
        .await?;
        LogEntry::try_from(row)
    }

    async fn list_logs(&self, limit: i64) -> StoreResult<Vec<LogEntry>> {
        let mut conn = self.conn().await?;
        let rows: Vec<LogRow> = diesel_async::RunQueryDsl::load(
            server_logs::table
                .order(server_logs::id.desc())
                .limit(limit)
                .select(LogRow::as_select()),
            &mut conn,
        )
        .await?;
        convert_all(rows)
    }
}
