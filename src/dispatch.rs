//! Permission & Command Engine
//!
//! Consumes a command line from an Active session, enforces the
//! permission table, mutates the Directory and account store, and
//! produces the reply/broadcast effects the server actor applies. Every
//! rejected command yields exactly one reply to the sender and no state
//! change.

use tracing::{error, info};

use crate::config::ServerOptions;
use crate::directory::{Directory, RoomChange};
use crate::error::AppError;
use crate::message::{kind, Envelope};
use crate::store::{hash_password, AccountStore, ROOT_NAME};
use crate::types::Permission;

/// Side effects a command produces, applied by the server actor.
#[derive(Debug, PartialEq)]
pub enum Effect {
    /// Send to the issuing connection
    Reply(Envelope),
    /// Send to one named active session
    DirectTo(String, Envelope),
    /// Send to every active session
    Broadcast(Envelope),
    /// Send the notice to the named session, then tear its connection down
    Kick { target: String, notice: Envelope },
}

/// Mutable view of server state a command may touch.
pub struct Engine<'a> {
    pub directory: &'a mut Directory,
    pub options: &'a mut ServerOptions,
    pub store: &'a AccountStore,
}

impl Engine<'_> {
    /// Dispatch one command line issued by the named Active session.
    pub fn execute(&mut self, sender: &str, line: &str) -> Vec<Effect> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(sender_permission) = self.directory.lookup(sender).map(|s| s.permission) else {
            // The session vanished between receipt and dispatch
            return vec![reply_text("You are not logged in.")];
        };

        let effects = match words.first().copied() {
            Some("room") => self.room(sender, sender_permission, &words, line),
            Some("manager") => self.manager(sender, sender_permission, &words),
            Some("kick") => self.kick(sender, sender_permission, &words),
            Some("update") => self.update(sender),
            Some("user") => self.user(sender, sender_permission, &words),
            Some("option") => self.option(sender_permission, &words),
            Some("resetpwd") => self.resetpwd(sender, &words),
            _ => vec![reply_text(format!("{line} is not a valid command."))],
        };
        effects
    }

    /// Trailing words from `words[from..]` joined back into one argument;
    /// room names and passwords may contain spaces.
    fn rest(words: &[&str], from: usize) -> Option<String> {
        if words.len() <= from {
            return None;
        }
        Some(words[from..].join(" "))
    }

    fn syntax(line: &str) -> Vec<Effect> {
        vec![reply_text(format!("SyntaxError: {line}"))]
    }

    // room create/join/list/leave/delete
    fn room(
        &mut self,
        sender: &str,
        permission: Permission,
        words: &[&str],
        line: &str,
    ) -> Vec<Effect> {
        let Some(&sub) = words.get(1) else {
            return Self::syntax(line);
        };
        let mut effects = match sub {
            "create" => {
                let Some(name) = Self::rest(words, 2) else {
                    return Self::syntax(line);
                };
                if permission < Permission::Manager {
                    return vec![reply_text("You do not have the permission to create rooms.")];
                }
                info!("{sender} requests to create room {name}");
                match self.directory.create_room(&name) {
                    RoomChange::Done => {
                        self.directory.join_room(sender, &name);
                        vec![reply_text(format!("Room {name} created."))]
                    }
                    _ => vec![reply_text(format!(
                        "Room {name} already exists, abort creating."
                    ))],
                }
            }
            "join" => {
                let Some(name) = Self::rest(words, 2) else {
                    return Self::syntax(line);
                };
                match self.directory.join_room(sender, &name) {
                    RoomChange::Done => {
                        vec![reply_text(format!("You have joined room {name}."))]
                    }
                    _ => vec![reply_text(format!("{name} does not exist, abort joining."))],
                }
            }
            "list" => {
                let rooms = self.directory.rooms().join(", ");
                let joined = self
                    .directory
                    .lookup(sender)
                    .map(|s| s.rooms().join(", "))
                    .unwrap_or_default();
                vec![reply_text(format!(
                    "Now online rooms: [{rooms}]\nYou joined: [{joined}]"
                ))]
            }
            "leave" => {
                let Some(name) = Self::rest(words, 2) else {
                    return Self::syntax(line);
                };
                match self.directory.leave_room(sender, &name) {
                    RoomChange::Done => {
                        vec![reply_text(format!("You have left room {name}."))]
                    }
                    RoomChange::DefaultRoom => {
                        vec![reply_text("Leaving the default room is not allowed.")]
                    }
                    _ => vec![reply_text(format!("{name} does not exist, abort leaving."))],
                }
            }
            "delete" => {
                let Some(name) = Self::rest(words, 2) else {
                    return Self::syntax(line);
                };
                if permission < Permission::Admin {
                    return vec![reply_text(format!(
                        "You do not have the permission to delete room {name}."
                    ))];
                }
                info!("{sender} requests to delete room {name}");
                match self.directory.delete_room(&name) {
                    Ok(evicted) => {
                        let mut effects: Vec<Effect> = evicted
                            .into_iter()
                            .map(|member| {
                                Effect::DirectTo(
                                    member,
                                    Envelope::server_text(format!(
                                        "Room {name} was deleted by an administrator, \
                                         you have left it automatically."
                                    )),
                                )
                            })
                            .collect();
                        effects.push(reply_text(format!("Room {name} deleted.")));
                        effects
                    }
                    Err(RoomChange::DefaultRoom) => {
                        vec![reply_text("The default room cannot be deleted.")]
                    }
                    Err(_) => vec![reply_text(format!(
                        "{name} does not exist, abort deleting."
                    ))],
                }
            }
            _ => return Self::syntax(line),
        };
        // Every room command refreshes the sender's own room manifest
        effects.push(self.room_manifest(sender));
        effects
    }

    fn room_manifest(&self, sender: &str) -> Effect {
        let rooms = self
            .directory
            .lookup(sender)
            .map(|s| s.rooms())
            .unwrap_or_default();
        let body = serde_json::to_string(&rooms).unwrap_or_else(|_| "[]".to_string());
        Effect::Reply(Envelope::server(body, kind::ROOM_MANIFEST))
    }

    // manager add/delete/list
    fn manager(&mut self, sender: &str, permission: Permission, words: &[&str]) -> Vec<Effect> {
        match words.get(1).copied() {
            Some("list") => {
                let managers = self.directory.list_managers();
                let body = serde_json::to_string(&managers).unwrap_or_else(|_| "[]".to_string());
                vec![Effect::Reply(Envelope::server(body, kind::MANAGER_LIST))]
            }
            Some(sub @ ("add" | "delete")) => {
                if permission < Permission::Admin {
                    return vec![reply_text("You do not have the permission to manage users.")];
                }
                let Some(&target) = words.get(2) else {
                    return Self::syntax(&words.join(" "));
                };
                if target == ROOT_NAME {
                    return vec![reply_text("The root account cannot be changed.")];
                }
                let (wanted, new_permission, notice) = if sub == "add" {
                    (
                        Permission::User,
                        Permission::Manager,
                        "You have been promoted to Manager by an administrator.",
                    )
                } else {
                    (
                        Permission::Manager,
                        Permission::User,
                        "You have been removed from the Manager group by an administrator.",
                    )
                };
                info!("{sender} requests to set {target} permission to {new_permission}");
                match self.directory.lookup_mut(target) {
                    Some(session) if session.permission == wanted => {
                        session.permission = new_permission;
                        vec![
                            Effect::DirectTo(target.to_string(), Envelope::server_text(notice)),
                            reply_text(format!("{target} permission changed to {new_permission}.")),
                        ]
                    }
                    _ => vec![reply_text(format!(
                        "{target} does not exist or has a different permission, abort."
                    ))],
                }
            }
            _ => Self::syntax(&words.join(" ")),
        }
    }

    // kick <user> [reason...]
    fn kick(&mut self, sender: &str, permission: Permission, words: &[&str]) -> Vec<Effect> {
        let Some(&target) = words.get(1) else {
            return Self::syntax(&words.join(" "));
        };
        if permission < Permission::Manager {
            return vec![reply_text(format!(
                "You do not have the permission to kick {target}."
            ))];
        }
        info!("{sender} requests to kick {target}");
        if target == sender {
            // Refused, and everyone gets to hear about it
            return vec![
                reply_text("You cannot kick yourself!!!"),
                Effect::Broadcast(Envelope::server_text(format!(
                    "[News] {sender} tried to kick themselves out of the server."
                ))),
            ];
        }
        match self.directory.lookup(target) {
            Some(session) if session.permission < permission => {
                let reason = Self::rest(words, 2)
                    .map(|r| format!(", {r}"))
                    .unwrap_or_default();
                vec![
                    Effect::Kick {
                        target: target.to_string(),
                        notice: Envelope::server(
                            format!("You have been kicked from the server{reason}."),
                            kind::KICK_NOTICE,
                        ),
                    },
                    reply_text(format!("{target} kicked.")),
                ]
            }
            _ => vec![reply_text(format!(
                "{target} does not exist or has an equal or higher permission, abort kicking."
            ))],
        }
    }

    // update - resend own manifests
    fn update(&mut self, sender: &str) -> Vec<Effect> {
        info!("{sender} requests a manual manifest update");
        let users = self.directory.list_usernames();
        let body = serde_json::to_string(&users).unwrap_or_else(|_| "[]".to_string());
        vec![
            Effect::Reply(Envelope::new(
                body,
                crate::message::SERVER_NAME,
                self.directory.default_room(),
                kind::USER_MANIFEST,
            )),
            self.room_manifest(sender),
            reply_text("Your manifests have been refreshed."),
        ]
    }

    // user create/setpwd/setper/delete/ban/restore
    fn user(&mut self, sender: &str, permission: Permission, words: &[&str]) -> Vec<Effect> {
        if permission < Permission::Admin {
            return vec![reply_text("You do not have the permission to manage accounts.")];
        }
        let line = words.join(" ");
        let (Some(&sub), Some(&target)) = (words.get(1), words.get(2)) else {
            return Self::syntax(&line);
        };
        info!("{sender} requests account operation: {sub} {target}");
        match sub {
            "create" => {
                let Some(&permission_word) = words.get(3) else {
                    return Self::syntax(&line);
                };
                let Ok(new_permission) = permission_word.parse::<Permission>() else {
                    return Self::syntax(&line);
                };
                let Some(password) = Self::rest(words, 4) else {
                    return Self::syntax(&line);
                };
                if target == crate::login::RESERVED_NAME || self.directory.name_taken(target) {
                    return vec![reply_text(format!("{target} already exists."))];
                }
                match self
                    .store
                    .create_account(target, &hash_password(&password), new_permission)
                {
                    Ok(true) => vec![reply_text(format!(
                        "{target} created, permission: {new_permission}."
                    ))],
                    Ok(false) => vec![reply_text(format!("{target} already exists."))],
                    Err(e) => persistence_failure(e),
                }
            }
            "setpwd" => {
                let Some(password) = Self::rest(words, 3) else {
                    return Self::syntax(&line);
                };
                match self.store.set_password(target, &hash_password(&password)) {
                    Ok(true) => {
                        let mut effects = Vec::new();
                        if self.directory.name_taken(target) {
                            effects.push(Effect::DirectTo(
                                target.to_string(),
                                Envelope::server_text("Your password was changed by an administrator."),
                            ));
                        }
                        effects.push(reply_text(format!("{target} password set.")));
                        effects
                    }
                    Ok(false) => vec![reply_text(format!("{target} does not exist."))],
                    Err(e) => persistence_failure(e),
                }
            }
            "setper" => {
                let Some(permission_word) = words.get(3) else {
                    return Self::syntax(&line);
                };
                let Ok(new_permission) = permission_word.parse::<Permission>() else {
                    return Self::syntax(&line);
                };
                if target == ROOT_NAME {
                    return vec![reply_text("You cannot set the permission of root.")];
                }
                match self.store.set_permission(target, new_permission) {
                    Ok(true) => {
                        let mut effects = Vec::new();
                        if let Some(session) = self.directory.lookup_mut(target) {
                            session.permission = new_permission;
                            effects.push(Effect::DirectTo(
                                target.to_string(),
                                Envelope::server_text(format!(
                                    "Your permission was changed to {new_permission}."
                                )),
                            ));
                        }
                        effects.push(reply_text(format!(
                            "Successfully changed {target} permission to {new_permission}."
                        )));
                        effects
                    }
                    Ok(false) => vec![reply_text(format!("{target} does not exist."))],
                    Err(e) => persistence_failure(e),
                }
            }
            "delete" => {
                if target == sender || target == ROOT_NAME {
                    return vec![reply_text("You cannot delete yourself or root.")];
                }
                match self.guard_admin_target(sender, target) {
                    Ok(()) => {}
                    Err(effects) => return effects,
                }
                match self.store.delete_account(target) {
                    Ok(true) => {
                        let mut effects = Vec::new();
                        if self.directory.name_taken(target) {
                            effects.push(Effect::Kick {
                                target: target.to_string(),
                                notice: Envelope::server(
                                    "You have been kicked from the server \
                                     and your account was deleted.",
                                    kind::KICK_NOTICE,
                                ),
                            });
                        }
                        effects.push(reply_text(format!("{target} deleted.")));
                        effects
                    }
                    Ok(false) => vec![reply_text(format!("{target} does not exist."))],
                    Err(e) => persistence_failure(e),
                }
            }
            "ban" => {
                if target == sender || target == ROOT_NAME {
                    return vec![reply_text("You cannot ban yourself or root.")];
                }
                match self.guard_admin_target(sender, target) {
                    Ok(()) => {}
                    Err(effects) => return effects,
                }
                match self.store.set_ban(target, true) {
                    Ok(true) => {
                        let mut effects = Vec::new();
                        if self.directory.name_taken(target) {
                            let reason = Self::rest(words, 3)
                                .map(|r| format!(", {r}"))
                                .unwrap_or_default();
                            effects.push(Effect::Kick {
                                target: target.to_string(),
                                notice: Envelope::server(
                                    format!(
                                        "You have been kicked from the server and banned{reason}."
                                    ),
                                    kind::KICK_NOTICE,
                                ),
                            });
                        }
                        effects.push(reply_text(format!("{target} banned.")));
                        effects
                    }
                    Ok(false) => vec![reply_text(format!("{target} does not exist."))],
                    Err(e) => persistence_failure(e),
                }
            }
            "restore" => match self.store.set_ban(target, false) {
                Ok(true) => vec![reply_text(format!("{target} unbanned."))],
                Ok(false) => vec![reply_text(format!("{target} does not exist."))],
                Err(e) => persistence_failure(e),
            },
            other => vec![reply_text(format!("{other} is not a valid operation."))],
        }
    }

    /// Admin accounts may only be deleted or banned by root.
    fn guard_admin_target(&self, sender: &str, target: &str) -> Result<(), Vec<Effect>> {
        let stored_permission = match self.store.get_account(target) {
            Ok(Some(account)) => account.permission,
            Ok(None) => Permission::User,
            Err(e) => return Err(persistence_failure(e)),
        };
        if stored_permission == Permission::Admin && sender != ROOT_NAME {
            return Err(vec![reply_text(format!(
                "{target} is an administrator, only root can do that."
            ))]);
        }
        Ok(())
    }

    // option show/set - Admin only
    fn option(&mut self, permission: Permission, words: &[&str]) -> Vec<Effect> {
        if permission < Permission::Admin {
            return vec![reply_text("You do not have the permission to change server options.")];
        }
        match words.get(1).copied() {
            Some("show") => vec![reply_text(self.options.show())],
            Some("set") => {
                let (Some(&key), Some(&value)) = (words.get(2), words.get(3)) else {
                    return Self::syntax(&words.join(" "));
                };
                if self.options.set(key, value) {
                    vec![reply_text(format!("Option {key} has been set to {value}."))]
                } else {
                    vec![reply_text(format!(
                        "Option {key} not found or bad value, please check typing."
                    ))]
                }
            }
            _ => Self::syntax(&words.join(" ")),
        }
    }

    // resetpwd <newpwd...> - self-service, any permission
    fn resetpwd(&mut self, sender: &str, words: &[&str]) -> Vec<Effect> {
        let Some(password) = Self::rest(words, 1) else {
            return vec![reply_text("Password needed!")];
        };
        info!("{sender} requests to reset their password");
        match self.store.set_password(sender, &hash_password(&password)) {
            Ok(true) => vec![reply_text("Successfully changed your password.")],
            Ok(false) => vec![reply_text(format!(
                "{sender} is not in the database, cannot reset password."
            ))],
            Err(e) => persistence_failure(e),
        }
    }
}

fn reply_text(message: impl Into<String>) -> Effect {
    Effect::Reply(Envelope::server_text(message))
}

fn persistence_failure(e: AppError) -> Vec<Effect> {
    error!("account store operation failed: {e}");
    vec![reply_text("Server error, please try again later.")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::types::{ConnId, SessionId};

    struct Fixture {
        directory: Directory,
        options: ServerOptions,
        store: AccountStore,
    }

    impl Fixture {
        fn new() -> Self {
            let mut directory = Directory::new("Lobby");
            for (i, (name, permission)) in [
                ("alice", Permission::User),
                ("mallory", Permission::Manager),
                ("root", Permission::Admin),
            ]
            .into_iter()
            .enumerate()
            {
                directory.register_session(Session::new(
                    name,
                    SessionId(i as u64),
                    permission,
                    ConnId::new(),
                    "Lobby",
                ));
            }
            Self {
                directory,
                options: ServerOptions::default(),
                store: AccountStore::open_in_memory().unwrap(),
            }
        }

        fn execute(&mut self, sender: &str, line: &str) -> Vec<Effect> {
            Engine {
                directory: &mut self.directory,
                options: &mut self.options,
                store: &self.store,
            }
            .execute(sender, line)
        }
    }

    fn reply_texts(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Reply(envelope) => Some(envelope.message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_room_create_denied_below_manager() {
        let mut fx = Fixture::new();
        let effects = fx.execute("alice", "room create VIP");
        assert!(reply_texts(&effects)[0].contains("permission"));
        // No mutation happened
        assert!(!fx.directory.room_exists("VIP"));
        assert_eq!(fx.directory.rooms().len(), 1);
    }

    #[test]
    fn test_room_create_auto_joins_creator() {
        let mut fx = Fixture::new();
        let effects = fx.execute("mallory", "room create VIP");
        assert!(fx.directory.room_exists("VIP"));
        assert!(fx.directory.lookup("mallory").unwrap().in_room("VIP"));
        // Reply plus refreshed room manifest
        assert!(matches!(effects.last(), Some(Effect::Reply(e)) if e.kind == kind::ROOM_MANIFEST));
    }

    #[test]
    fn test_room_name_with_spaces() {
        let mut fx = Fixture::new();
        fx.execute("mallory", "room create VIP Lounge");
        assert!(fx.directory.room_exists("VIP Lounge"));
    }

    #[test]
    fn test_room_leave_default_rejected_for_admin_too() {
        let mut fx = Fixture::new();
        let effects = fx.execute("root", "room leave Lobby");
        assert!(reply_texts(&effects)[0].contains("default room"));
        assert!(fx.directory.lookup("root").unwrap().in_room("Lobby"));
    }

    #[test]
    fn test_room_delete_requires_admin_and_notifies_members() {
        let mut fx = Fixture::new();
        fx.execute("mallory", "room create VIP");
        fx.execute("alice", "room join VIP");

        let denied = fx.execute("mallory", "room delete VIP");
        assert!(reply_texts(&denied)[0].contains("permission"));
        assert!(fx.directory.room_exists("VIP"));

        let effects = fx.execute("root", "room delete VIP");
        assert!(!fx.directory.room_exists("VIP"));
        let notified: Vec<&String> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::DirectTo(name, _) => Some(name),
                _ => None,
            })
            .collect();
        assert!(notified.contains(&&"mallory".to_string()));
        assert!(notified.contains(&&"alice".to_string()));
    }

    #[test]
    fn test_manager_add_and_delete() {
        let mut fx = Fixture::new();
        let effects = fx.execute("root", "manager add alice");
        assert_eq!(
            fx.directory.lookup("alice").unwrap().permission,
            Permission::Manager
        );
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::DirectTo(name, _) if name == "alice")));

        fx.execute("root", "manager delete alice");
        assert_eq!(
            fx.directory.lookup("alice").unwrap().permission,
            Permission::User
        );
    }

    #[test]
    fn test_manager_add_denied_below_admin() {
        let mut fx = Fixture::new();
        let effects = fx.execute("mallory", "manager add alice");
        assert!(reply_texts(&effects)[0].contains("permission"));
        assert_eq!(
            fx.directory.lookup("alice").unwrap().permission,
            Permission::User
        );
    }

    #[test]
    fn test_manager_list_open_to_users() {
        let mut fx = Fixture::new();
        let effects = fx.execute("alice", "manager list");
        match &effects[0] {
            Effect::Reply(envelope) => {
                assert_eq!(envelope.kind, kind::MANAGER_LIST);
                assert_eq!(envelope.message, "[\"mallory\"]");
            }
            other => panic!("wrong effect: {other:?}"),
        }
    }

    #[test]
    fn test_kick_requires_manager_and_lower_target() {
        let mut fx = Fixture::new();
        let denied = fx.execute("alice", "kick mallory");
        assert!(reply_texts(&denied)[0].contains("permission"));

        // Equal permission targets are refused
        fx.execute("root", "manager add alice");
        let refused = fx.execute("mallory", "kick alice");
        assert!(reply_texts(&refused)[0].contains("abort kicking"));

        fx.execute("root", "manager delete alice");
        let effects = fx.execute("mallory", "kick alice bad behavior");
        match &effects[0] {
            Effect::Kick { target, notice } => {
                assert_eq!(target, "alice");
                assert_eq!(notice.kind, kind::KICK_NOTICE);
                assert!(notice.message.contains("bad behavior"));
            }
            other => panic!("wrong effect: {other:?}"),
        }
    }

    #[test]
    fn test_self_kick_refused_and_announced() {
        let mut fx = Fixture::new();
        let effects = fx.execute("mallory", "kick mallory");
        assert!(reply_texts(&effects)[0].contains("yourself"));
        assert!(effects.iter().any(|e| matches!(e, Effect::Broadcast(_))));
        assert!(fx.directory.lookup("mallory").is_some());
    }

    #[test]
    fn test_user_commands_denied_below_admin() {
        let mut fx = Fixture::new();
        let effects = fx.execute("mallory", "user ban alice");
        assert!(reply_texts(&effects)[0].contains("permission"));
        // Store untouched
        assert!(fx.store.get_account("alice").unwrap().is_none());
    }

    #[test]
    fn test_user_create_and_ban_online_target() {
        let mut fx = Fixture::new();
        fx.execute("root", "user create dave User secret pw");
        let dave = fx.store.get_account("dave").unwrap().unwrap();
        assert_eq!(dave.permission, Permission::User);
        assert_eq!(dave.password_hash, hash_password("secret pw"));

        // alice is online and registered: ban kicks her
        fx.store
            .create_account("alice", &hash_password("pw"), Permission::User)
            .unwrap();
        let effects = fx.execute("root", "user ban alice spamming");
        assert!(fx.store.get_account("alice").unwrap().unwrap().banned);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Kick { target, .. } if target == "alice")));

        fx.execute("root", "user restore alice");
        assert!(!fx.store.get_account("alice").unwrap().unwrap().banned);
    }

    #[test]
    fn test_root_immune_to_ban_delete_setper() {
        let mut fx = Fixture::new();
        // A second admin session, not root
        fx.directory.register_session(Session::new(
            "admin2",
            SessionId(9),
            Permission::Admin,
            ConnId::new(),
            "Lobby",
        ));
        for line in ["user ban root", "user delete root", "user setper root User"] {
            let effects = fx.execute("admin2", line);
            assert!(
                reply_texts(&effects)[0].contains("root"),
                "{line} must be refused"
            );
        }
        assert_eq!(
            fx.store.get_account("root").unwrap().unwrap().permission,
            Permission::Admin
        );
    }

    #[test]
    fn test_admin_account_only_deletable_by_root() {
        let mut fx = Fixture::new();
        fx.store
            .create_account("boss", &hash_password("pw"), Permission::Admin)
            .unwrap();
        fx.directory.register_session(Session::new(
            "admin2",
            SessionId(9),
            Permission::Admin,
            ConnId::new(),
            "Lobby",
        ));
        let refused = fx.execute("admin2", "user delete boss");
        assert!(reply_texts(&refused)[0].contains("only root"));
        assert!(fx.store.get_account("boss").unwrap().is_some());

        fx.execute("root", "user delete boss");
        assert!(fx.store.get_account("boss").unwrap().is_none());
    }

    #[test]
    fn test_user_setper_updates_live_session() {
        let mut fx = Fixture::new();
        fx.store
            .create_account("alice", &hash_password("pw"), Permission::User)
            .unwrap();
        fx.execute("root", "user setper alice Manager");
        assert_eq!(
            fx.store.get_account("alice").unwrap().unwrap().permission,
            Permission::Manager
        );
        assert_eq!(
            fx.directory.lookup("alice").unwrap().permission,
            Permission::Manager
        );
    }

    #[test]
    fn test_option_admin_only() {
        let mut fx = Fixture::new();
        let denied = fx.execute("alice", "option set lockServer true");
        assert!(reply_texts(&denied)[0].contains("permission"));
        assert!(!fx.options.lock_server);

        fx.execute("root", "option set lockServer true");
        assert!(fx.options.lock_server);

        let shown = fx.execute("root", "option show");
        assert!(reply_texts(&shown)[0].contains("lockServer: true"));
    }

    #[test]
    fn test_resetpwd_self_service() {
        let mut fx = Fixture::new();
        let missing = fx.execute("alice", "resetpwd");
        assert!(reply_texts(&missing)[0].contains("Password needed"));

        // Not registered: no store row to update
        let unknown = fx.execute("alice", "resetpwd newpw");
        assert!(reply_texts(&unknown)[0].contains("not in the database"));

        fx.store
            .create_account("alice", &hash_password("old"), Permission::User)
            .unwrap();
        fx.execute("alice", "resetpwd new pass");
        assert_eq!(
            fx.store.get_account("alice").unwrap().unwrap().password_hash,
            hash_password("new pass")
        );
    }

    #[test]
    fn test_unknown_command_single_reply() {
        let mut fx = Fixture::new();
        let effects = fx.execute("alice", "frobnicate now");
        assert_eq!(effects.len(), 1);
        assert!(reply_texts(&effects)[0].contains("not a valid command"));
    }

    #[test]
    fn test_missing_arguments_syntax_error() {
        let mut fx = Fixture::new();
        for line in ["room", "room create", "kick", "user", "option set lockServer"] {
            let effects = fx.execute("root", line);
            assert_eq!(effects.len(), 1, "{line}");
            let text = reply_texts(&effects);
            assert!(
                text[0].contains("SyntaxError") || text[0].contains("not a valid"),
                "{line}: {text:?}"
            );
        }
    }
}
