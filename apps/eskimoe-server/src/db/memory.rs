use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::store::{
    EntityStore, OrderKey, ReactionAdded, ReactionRemoved, StoreError, StoreResult,
};
use crate::models::category::{Category, NewCategory};
use crate::models::invite::{Invite, NewInvite};
use crate::models::log::{LogEntry, NewLogEntry};
use crate::models::member::{Member, MemberStatus, NewMember};
use crate::models::message::{Message, NewMessage};
use crate::models::ordered_ids::{OrderedIds, ReorderError};
use crate::models::reaction::{MessageReaction, NewServerReaction, ServerReaction};
use crate::models::role::{NewRole, Role};
use crate::models::room::{NewRoom, Room};
use crate::models::server::ServerSettings;

/// Store operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    SaveServer,
    SaveCategoryOrder,
    SaveRoleOrder,
    SaveRoomOrder,
    CreateMember,
    UpdateMember,
    CreateRole,
    UpdateRole,
    DeleteRole,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    CreateRoom,
    UpdateRoom,
    DeleteRoom,
    CreateMessage,
    UpdateMessage,
    DeleteMessage,
    WriteReaction,
    WriteInvite,
    AppendLog,
}

/// Monotonic id source for one table. Ids start at 1 and are never reused.
#[derive(Debug, Default)]
struct Sequence(i32);

impl Sequence {
    fn next(&mut self) -> i32 {
        self.0 += 1;
        self.0
    }
}

#[derive(Default)]
struct Tables {
    server: Option<ServerSettings>,
    members: BTreeMap<i32, Member>,
    roles: BTreeMap<i32, Role>,
    categories: BTreeMap<i32, Category>,
    rooms: BTreeMap<i32, Room>,
    messages: BTreeMap<i32, Message>,
    server_reactions: BTreeMap<i32, ServerReaction>,
    message_reactions: BTreeMap<i32, MessageReaction>,
    invites: BTreeMap<i32, Invite>,
    logs: BTreeMap<i32, LogEntry>,
    member_ids: Sequence,
    role_ids: Sequence,
    category_ids: Sequence,
    room_ids: Sequence,
    message_ids: Sequence,
    server_reaction_ids: Sequence,
    message_reaction_ids: Sequence,
    invite_ids: Sequence,
    log_ids: Sequence,
}

impl Tables {
    fn order_mut(&mut self, key: OrderKey) -> StoreResult<&mut OrderedIds> {
        match key {
            OrderKey::Categories => self.server.as_mut().map(|s| &mut s.category_order),
            OrderKey::Roles => self.server.as_mut().map(|s| &mut s.role_order),
            OrderKey::Rooms { category_id } => self
                .categories
                .get_mut(&category_id)
                .map(|c| &mut c.room_order),
        }
        .ok_or(StoreError::NotFound(key.owner()))
    }
}

fn order_fault(key: OrderKey) -> FaultPoint {
    match key {
        OrderKey::Categories => FaultPoint::SaveCategoryOrder,
        OrderKey::Roles => FaultPoint::SaveRoleOrder,
        OrderKey::Rooms { .. } => FaultPoint::SaveRoomOrder,
    }
}

/// In-process [`EntityStore`] used by tests and by servers started without
/// a database. Data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    faults: Mutex<HashSet<FaultPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call through `point` fail with a backend
    /// error until [`MemoryStore::clear_faults`].
    pub fn inject_fault(&self, point: FaultPoint) {
        self.faults.lock().insert(point);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn check(&self, point: FaultPoint) -> StoreResult<()> {
        if self.faults.lock().contains(&point) {
            return Err(StoreError::Backend(format!("injected fault at {point:?}")));
        }
        Ok(())
    }
}

fn replace<T: Clone>(
    table: &mut BTreeMap<i32, T>,
    id: i32,
    value: &T,
    entity: &'static str,
) -> StoreResult<T> {
    match table.get_mut(&id) {
        Some(slot) => {
            *slot = value.clone();
            Ok(value.clone())
        }
        None => Err(StoreError::NotFound(entity)),
    }
}

fn remove<T>(table: &mut BTreeMap<i32, T>, id: i32, entity: &'static str) -> StoreResult<T> {
    table.remove(&id).ok_or(StoreError::NotFound(entity))
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load_server(&self) -> StoreResult<Option<ServerSettings>> {
        Ok(self.tables.lock().server.clone())
    }

    async fn save_server(&self, server: &ServerSettings) -> StoreResult<()> {
        self.check(FaultPoint::SaveServer)?;
        self.tables.lock().server = Some(server.clone());
        Ok(())
    }

    // -- ordering -----------------------------------------------------------

    async fn link_ordered(&self, key: OrderKey, id: i32, position: Option<usize>) -> StoreResult<()> {
        self.check(order_fault(key))?;
        let mut tables = self.tables.lock();
        let order = tables.order_mut(key)?;
        match position {
            Some(index) => order.insert(index, id),
            None => order.push(id),
        };
        Ok(())
    }

    async fn unlink_ordered(&self, key: OrderKey, id: i32) -> StoreResult<Option<usize>> {
        self.check(order_fault(key))?;
        let mut tables = self.tables.lock();
        let order = tables.order_mut(key)?;
        let position = order.position(id);
        order.remove(id);
        Ok(position)
    }

    async fn reorder(
        &self,
        key: OrderKey,
        proposed: Vec<i32>,
    ) -> StoreResult<Result<OrderedIds, ReorderError>> {
        self.check(order_fault(key))?;
        let mut tables = self.tables.lock();
        let order = tables.order_mut(key)?;
        Ok(order.reorder(proposed).map(|next| {
            *order = next.clone();
            next
        }))
    }

    // -- members ------------------------------------------------------------

    async fn member(&self, id: i32) -> StoreResult<Option<Member>> {
        Ok(self.tables.lock().members.get(&id).cloned())
    }

    async fn member_by_unique_id(&self, unique_id: &str) -> StoreResult<Option<Member>> {
        Ok(self
            .tables
            .lock()
            .members
            .values()
            .find(|m| m.unique_id == unique_id)
            .cloned())
    }

    async fn member_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Member>> {
        Ok(self
            .tables
            .lock()
            .members
            .values()
            .find(|m| m.token_hash.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        Ok(self.tables.lock().members.values().cloned().collect())
    }

    async fn create_member(&self, new: NewMember) -> StoreResult<Member> {
        self.check(FaultPoint::CreateMember)?;
        let mut tables = self.tables.lock();
        if tables.members.values().any(|m| m.unique_id == new.unique_id) {
            return Err(StoreError::Conflict(format!(
                "member {} already exists",
                new.unique_id
            )));
        }
        let member = Member {
            id: tables.member_ids.next(),
            unique_id: new.unique_id,
            token_hash: Some(new.token_hash),
            display_name: new.display_name,
            about: String::new(),
            pronouns: String::new(),
            status: MemberStatus::Online,
            role_ids: new.role_ids,
            joined_at: Utc::now(),
        };
        tables.members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn update_member(&self, member: &Member) -> StoreResult<Member> {
        self.check(FaultPoint::UpdateMember)?;
        replace(&mut self.tables.lock().members, member.id, member, "member")
    }

    // -- roles --------------------------------------------------------------

    async fn role(&self, id: i32) -> StoreResult<Option<Role>> {
        Ok(self.tables.lock().roles.get(&id).cloned())
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self
            .tables
            .lock()
            .roles
            .values()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn default_role(&self) -> StoreResult<Option<Role>> {
        Ok(self
            .tables
            .lock()
            .roles
            .values()
            .find(|r| r.system_role)
            .cloned())
    }

    async fn roles_by_ids(&self, ids: &[i32]) -> StoreResult<Vec<Role>> {
        let tables = self.tables.lock();
        Ok(ids.iter().filter_map(|id| tables.roles.get(id).cloned()).collect())
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        Ok(self.tables.lock().roles.values().cloned().collect())
    }

    async fn create_role(&self, new: NewRole) -> StoreResult<Role> {
        self.check(FaultPoint::CreateRole)?;
        let mut tables = self.tables.lock();
        if tables.roles.values().any(|r| r.name.eq_ignore_ascii_case(&new.name)) {
            return Err(StoreError::Conflict(format!("role {} already exists", new.name)));
        }
        let role = Role {
            id: tables.role_ids.next(),
            name: new.name,
            permissions: new.permissions,
            system_role: new.system_role,
            created_at: Utc::now(),
        };
        tables.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update_role(&self, role: &Role) -> StoreResult<Role> {
        self.check(FaultPoint::UpdateRole)?;
        let mut tables = self.tables.lock();
        if tables
            .roles
            .values()
            .any(|r| r.id != role.id && r.name.eq_ignore_ascii_case(&role.name))
        {
            return Err(StoreError::Conflict(format!("role {} already exists", role.name)));
        }
        replace(&mut tables.roles, role.id, role, "role")
    }

    async fn delete_role(&self, id: i32) -> StoreResult<()> {
        self.check(FaultPoint::DeleteRole)?;
        let mut tables = self.tables.lock();
        remove(&mut tables.roles, id, "role")?;
        for member in tables.members.values_mut() {
            member.role_ids.retain(|role_id| *role_id != id);
        }
        Ok(())
    }

    // -- categories ---------------------------------------------------------

    async fn category(&self, id: i32) -> StoreResult<Option<Category>> {
        Ok(self.tables.lock().categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(self.tables.lock().categories.values().cloned().collect())
    }

    async fn create_category(&self, new: NewCategory) -> StoreResult<Category> {
        self.check(FaultPoint::CreateCategory)?;
        let mut tables = self.tables.lock();
        let category = Category {
            id: tables.category_ids.next(),
            name: new.name,
            room_order: OrderedIds::new(),
            created_at: Utc::now(),
        };
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, category: &Category) -> StoreResult<Category> {
        self.check(FaultPoint::UpdateCategory)?;
        let mut tables = self.tables.lock();
        let stored = tables
            .categories
            .get_mut(&category.id)
            .ok_or(StoreError::NotFound("category"))?;
        stored.name = category.name.clone();
        Ok(stored.clone())
    }

    async fn delete_category(&self, id: i32) -> StoreResult<()> {
        self.check(FaultPoint::DeleteCategory)?;
        let mut tables = self.tables.lock();
        if tables.rooms.values().any(|room| room.category_id == id) {
            return Err(StoreError::Conflict("category still contains rooms".into()));
        }
        remove(&mut tables.categories, id, "category").map(|_| ())
    }

    // -- rooms --------------------------------------------------------------

    async fn room(&self, id: i32) -> StoreResult<Option<Room>> {
        Ok(self.tables.lock().rooms.get(&id).cloned())
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        Ok(self.tables.lock().rooms.values().cloned().collect())
    }

    async fn create_room(&self, new: NewRoom) -> StoreResult<Room> {
        self.check(FaultPoint::CreateRoom)?;
        let mut tables = self.tables.lock();
        if !tables.categories.contains_key(&new.category_id) {
            return Err(StoreError::NotFound("category"));
        }
        let room = Room {
            id: tables.room_ids.next(),
            name: new.name,
            description: new.description,
            room_type: new.room_type,
            category_id: new.category_id,
            created_at: Utc::now(),
        };
        tables.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn update_room(&self, room: &Room) -> StoreResult<Room> {
        self.check(FaultPoint::UpdateRoom)?;
        replace(&mut self.tables.lock().rooms, room.id, room, "room")
    }

    async fn delete_room(&self, id: i32) -> StoreResult<()> {
        self.check(FaultPoint::DeleteRoom)?;
        let mut tables = self.tables.lock();
        remove(&mut tables.rooms, id, "room")?;
        let doomed: HashSet<i32> = tables
            .messages
            .values()
            .filter(|m| m.room_id == id)
            .map(|m| m.id)
            .collect();
        tables.messages.retain(|message_id, _| !doomed.contains(message_id));
        tables
            .message_reactions
            .retain(|_, r| !doomed.contains(&r.message_id));
        Ok(())
    }

    // -- messages -----------------------------------------------------------

    async fn message(&self, id: i32) -> StoreResult<Option<Message>> {
        Ok(self.tables.lock().messages.get(&id).cloned())
    }

    async fn recent_messages(&self, room_id: i32, limit: i64) -> StoreResult<Vec<Message>> {
        let tables = self.tables.lock();
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut recent: Vec<Message> = tables
            .messages
            .values()
            .rev()
            .filter(|m| m.room_id == room_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn create_message(&self, new: NewMessage) -> StoreResult<Message> {
        self.check(FaultPoint::CreateMessage)?;
        let mut tables = self.tables.lock();
        if !tables.rooms.contains_key(&new.room_id) {
            return Err(StoreError::NotFound("room"));
        }
        let message = Message {
            id: tables.message_ids.next(),
            content: new.content,
            author_id: new.author_id,
            room_id: new.room_id,
            edited: false,
            created_at: Utc::now(),
        };
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn update_message(&self, message: &Message) -> StoreResult<Message> {
        self.check(FaultPoint::UpdateMessage)?;
        replace(&mut self.tables.lock().messages, message.id, message, "message")
    }

    async fn delete_message(&self, id: i32) -> StoreResult<()> {
        self.check(FaultPoint::DeleteMessage)?;
        let mut tables = self.tables.lock();
        remove(&mut tables.messages, id, "message")?;
        tables.message_reactions.retain(|_, r| r.message_id != id);
        Ok(())
    }

    async fn delete_messages(&self, room_id: i32, ids: &[i32]) -> StoreResult<Vec<i32>> {
        self.check(FaultPoint::DeleteMessage)?;
        let mut tables = self.tables.lock();
        let mut deleted = Vec::new();
        for id in ids {
            if tables.messages.get(id).is_some_and(|m| m.room_id == room_id) {
                tables.messages.remove(id);
                deleted.push(*id);
            }
        }
        tables
            .message_reactions
            .retain(|_, r| !deleted.contains(&r.message_id));
        Ok(deleted)
    }

    // -- reactions ----------------------------------------------------------

    async fn server_reaction(&self, id: i32) -> StoreResult<Option<ServerReaction>> {
        Ok(self.tables.lock().server_reactions.get(&id).cloned())
    }

    async fn list_server_reactions(&self) -> StoreResult<Vec<ServerReaction>> {
        Ok(self.tables.lock().server_reactions.values().cloned().collect())
    }

    async fn create_server_reaction(&self, new: NewServerReaction) -> StoreResult<ServerReaction> {
        self.check(FaultPoint::WriteReaction)?;
        let mut tables = self.tables.lock();
        let reaction = ServerReaction {
            id: tables.server_reaction_ids.next(),
            reaction: new.reaction,
            color: new.color,
            created_at: Utc::now(),
        };
        tables.server_reactions.insert(reaction.id, reaction.clone());
        Ok(reaction)
    }

    async fn message_reaction(
        &self,
        message_id: i32,
        reaction_id: i32,
    ) -> StoreResult<Option<MessageReaction>> {
        Ok(self
            .tables
            .lock()
            .message_reactions
            .values()
            .find(|r| r.message_id == message_id && r.reaction_id == reaction_id)
            .cloned())
    }

    async fn reactions_for_messages(&self, message_ids: &[i32]) -> StoreResult<Vec<MessageReaction>> {
        Ok(self
            .tables
            .lock()
            .message_reactions
            .values()
            .filter(|r| message_ids.contains(&r.message_id))
            .cloned()
            .collect())
    }

    async fn add_reaction_member(
        &self,
        message_id: i32,
        reaction_id: i32,
        member_id: i32,
    ) -> StoreResult<ReactionAdded> {
        self.check(FaultPoint::WriteReaction)?;
        let mut tables = self.tables.lock();
        if !tables.messages.contains_key(&message_id) {
            return Err(StoreError::NotFound("message"));
        }
        let existing = tables
            .message_reactions
            .values_mut()
            .find(|r| r.message_id == message_id && r.reaction_id == reaction_id);
        if let Some(reaction) = existing {
            return Ok(if reaction.add_member(member_id) {
                ReactionAdded::Joined(reaction.clone())
            } else {
                ReactionAdded::AlreadyPresent(reaction.clone())
            });
        }
        let reaction = MessageReaction {
            id: tables.message_reaction_ids.next(),
            message_id,
            reaction_id,
            member_ids: vec![member_id],
            count: 1,
        };
        tables.message_reactions.insert(reaction.id, reaction.clone());
        Ok(ReactionAdded::Created(reaction))
    }

    async fn remove_reaction_member(
        &self,
        message_id: i32,
        reaction_id: i32,
        member_id: i32,
    ) -> StoreResult<ReactionRemoved> {
        self.check(FaultPoint::WriteReaction)?;
        let mut tables = self.tables.lock();
        let Some(reaction) = tables
            .message_reactions
            .values_mut()
            .find(|r| r.message_id == message_id && r.reaction_id == reaction_id)
        else {
            return Ok(ReactionRemoved::NotReacted);
        };
        if !reaction.remove_member(member_id) {
            return Ok(ReactionRemoved::NotReacted);
        }
        if !reaction.member_ids.is_empty() {
            return Ok(ReactionRemoved::Left(reaction.clone()));
        }
        let id = reaction.id;
        let removed = remove(&mut tables.message_reactions, id, "reaction")?;
        Ok(ReactionRemoved::Deleted(removed))
    }

    // -- invites ------------------------------------------------------------

    async fn invite_by_code(&self, code: &str) -> StoreResult<Option<Invite>> {
        Ok(self
            .tables
            .lock()
            .invites
            .values()
            .find(|i| i.code == code)
            .cloned())
    }

    async fn list_invites(&self) -> StoreResult<Vec<Invite>> {
        Ok(self.tables.lock().invites.values().cloned().collect())
    }

    async fn create_invite(&self, new: NewInvite) -> StoreResult<Invite> {
        self.check(FaultPoint::WriteInvite)?;
        let mut tables = self.tables.lock();
        let invite = Invite {
            id: tables.invite_ids.next(),
            code: new.code,
            used: false,
            generated_by: new.generated_by,
            used_by: None,
            created_at: Utc::now(),
        };
        tables.invites.insert(invite.id, invite.clone());
        Ok(invite)
    }

    async fn update_invite(&self, invite: &Invite) -> StoreResult<Invite> {
        self.check(FaultPoint::WriteInvite)?;
        replace(&mut self.tables.lock().invites, invite.id, invite, "invite")
    }

    async fn delete_invite(&self, id: i32) -> StoreResult<()> {
        self.check(FaultPoint::WriteInvite)?;
        remove(&mut self.tables.lock().invites, id, "invite").map(|_| ())
    }

    // -- logs ---------------------------------------------------------------

    async fn append_log(&self, new: NewLogEntry) -> StoreResult<LogEntry> {
        self.check(FaultPoint::AppendLog)?;
        let mut tables = self.tables.lock();
        let entry = LogEntry {
            id: tables.log_ids.next(),
            log_type: new.log_type,
            content: new.content,
            member_id: new.member_id,
            created_at: Utc::now(),
        };
        tables.logs.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn list_logs(&self, limit: i64) -> StoreResult<Vec<LogEntry>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .tables
            .lock()
            .logs
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
