use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, info, warn};
use uuid::Uuid;

use super::types::{avatar_initials, ActivityLog, NewUser, Role, RoleProvider, User, UserUpdate};
use crate::configuration::AuthSettings;
use crate::error_handling::types::AuthError;
use crate::storage::{load_json, save_json, Storage};

pub const SESSION_USER_KEY: &str = "session.user";
pub const ACTIVITY_LOGS_KEY: &str = "activity.logs";

/// Address recorded on activity entries.
const ACTIVITY_IP: &str = "192.168.1.X";

#[derive(Default)]
struct AuthState {
    users: Vec<User>,
    current: Option<User>,
    logs: Vec<ActivityLog>,
}

/// The structure related to identity and activity tracking
///
/// Holds the user registry in memory, while the logged-in user and the
/// activity log are persisted through `storage` so that a restart keeps the
/// session.
///
/// # Fields Overview
///
/// - `state`: registry, current user and activity log
/// - `storage`: key-value store for `session.user` and `activity.logs`
/// - `write_lock`: serializes mutations so persisted blobs follow the in-memory order
pub struct AuthService {
    state: Mutex<AuthState>,
    storage: Arc<dyn Storage>,
    write_lock: tokio::sync::Mutex<()>,
}

impl AuthService {
    /// Creates the service with a single seeded administrator.
    pub fn new(storage: Arc<dyn Storage>, settings: &AuthSettings) -> Self {
        let admin = User {
            id: Uuid::new_v4().to_string(),
            name: settings.admin_name.clone(),
            email: settings.admin_email.clone(),
            password: Some(settings.admin_password.clone()),
            role: Role::Admin,
            department: settings.admin_department.clone(),
            avatar: avatar_initials(&settings.admin_name),
        };
        Self {
            state: Mutex::new(AuthState {
                users: vec![admin],
                ..Default::default()
            }),
            storage,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Reloads the persisted session user and activity log.
    ///
    /// A stored user is matched against the registry by id, then by email;
    /// unknown users are dropped from the session.
    pub async fn restore(&self) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        let stored_user: Option<User> = load_json(self.storage.as_ref(), SESSION_USER_KEY).await?;
        let stored_logs: Option<Vec<ActivityLog>> =
            load_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY).await?;

        let mut drop_session = false;
        {
            let mut state = self.lock();
            if let Some(logs) = stored_logs {
                debug!("Restored {} activity entries", logs.len());
                state.logs = logs;
            }
            if let Some(stored) = stored_user {
                let known = state
                    .users
                    .iter()
                    .find(|u| u.id == stored.id)
                    .or_else(|| state.users.iter().find(|u| same_email(&u.email, &stored.email)))
                    .map(User::without_password);
                match known {
                    Some(user) => {
                        info!("Restored session for {}", user.email);
                        state.current = Some(user);
                    }
                    None => {
                        warn!("Stored session user {} is not registered, ignoring", stored.email);
                        drop_session = true;
                    }
                }
            }
        }
        if drop_session {
            self.storage.remove(SESSION_USER_KEY).await?;
        }
        Ok(())
    }

    pub fn current_user(&self) -> Option<User> {
        self.lock().current.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().current.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.current_role().is_admin()
    }

    /// Registered users, without passwords.
    pub fn users(&self) -> Vec<User> {
        self.lock().users.iter().map(User::without_password).collect()
    }

    /// Activity log, newest first.
    pub fn activity_logs(&self) -> Vec<ActivityLog> {
        self.lock().logs.clone()
    }

    /// Email comparison is case-insensitive, the password is exact.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let _guard = self.write_lock.lock().await;
        let (user, logs) = {
            let mut state = self.lock();
            let found = state
                .users
                .iter()
                .find(|u| same_email(&u.email, email) && u.password.as_deref() == Some(password))
                .cloned();
            let Some(found) = found else {
                warn!("Failed login attempt for {}", email);
                return Err(AuthError::InvalidCredentials);
            };
            let safe = found.without_password();
            state.current = Some(safe.clone());
            push_log(&mut state, &found, "LOGIN", "User logged in successfully");
            (safe, state.logs.clone())
        };
        save_json(self.storage.as_ref(), SESSION_USER_KEY, &user).await?;
        save_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY, &logs).await?;
        info!("{} logged in as {}", user.email, user.role);
        Ok(user)
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        let logs = {
            let mut state = self.lock();
            match state.current.take() {
                Some(user) => {
                    push_log(&mut state, &user, "LOGOUT", "User logged out");
                    info!("{} logged out", user.email);
                    Some(state.logs.clone())
                }
                None => None,
            }
        };
        if let Some(logs) = logs {
            save_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY, &logs).await?;
        }
        self.storage.remove(SESSION_USER_KEY).await?;
        Ok(())
    }

    pub async fn add_user(&self, new_user: NewUser) -> Result<User, AuthError> {
        let _guard = self.write_lock.lock().await;
        let (user, logs) = {
            let mut state = self.lock();
            let actor = require_admin(&state)?;
            if state.users.iter().any(|u| same_email(&u.email, &new_user.email)) {
                return Err(AuthError::DuplicateEmail(new_user.email));
            }
            let user = User {
                id: Uuid::new_v4().to_string(),
                avatar: avatar_initials(&new_user.name),
                name: new_user.name,
                email: new_user.email,
                password: Some(new_user.password),
                role: new_user.role,
                department: new_user.department,
            };
            state.users.push(user.clone());
            push_log(&mut state, &actor, "ADD_USER", &format!("Added user: {}", user.email));
            (user.without_password(), state.logs.clone())
        };
        save_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY, &logs).await?;
        info!("Added user {} ({})", user.email, user.role);
        Ok(user)
    }

    /// Applies `update` to user `id`. When the current user is the target,
    /// the persisted session is refreshed too.
    pub async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User, AuthError> {
        let _guard = self.write_lock.lock().await;
        let (user, session, logs) = {
            let mut state = self.lock();
            let actor = require_admin(&state)?;
            if let Some(email) = &update.email {
                if state
                    .users
                    .iter()
                    .any(|u| u.id != id && same_email(&u.email, email))
                {
                    return Err(AuthError::DuplicateEmail(email.clone()));
                }
            }
            let target = state
                .users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| AuthError::UserNotFound(id.to_string()))?;
            apply_update(target, update);
            let updated = target.without_password();

            let session = match &state.current {
                Some(current) if current.id == id => {
                    state.current = Some(updated.clone());
                    Some(updated.clone())
                }
                _ => None,
            };
            push_log(
                &mut state,
                &actor,
                "UPDATE_USER",
                &format!("Admin updated profile for user ID: {}", id),
            );
            (updated, session, state.logs.clone())
        };
        if let Some(session) = session {
            save_json(self.storage.as_ref(), SESSION_USER_KEY, &session).await?;
        }
        save_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY, &logs).await?;
        Ok(user)
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        let logs = {
            let mut state = self.lock();
            let actor = require_admin(&state)?;
            if actor.id == id {
                return Err(AuthError::CannotDeleteSelf);
            }
            let index = state
                .users
                .iter()
                .position(|u| u.id == id)
                .ok_or_else(|| AuthError::UserNotFound(id.to_string()))?;
            let removed = state.users.remove(index);
            push_log(&mut state, &actor, "DELETE_USER", &format!("Deleted user: {}", removed.email));
            info!("Deleted user {}", removed.email);
            state.logs.clone()
        };
        save_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY, &logs).await?;
        Ok(())
    }

    /// Changes the current user's password; `old_password` must match.
    pub async fn update_password(&self, old_password: &str, new_password: &str) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        let logs = {
            let mut state = self.lock();
            let current = state.current.clone().ok_or(AuthError::NotAuthenticated)?;
            let user = state
                .users
                .iter_mut()
                .find(|u| u.id == current.id)
                .ok_or_else(|| AuthError::UserNotFound(current.id.clone()))?;
            if user.password.as_deref() != Some(old_password) {
                return Err(AuthError::InvalidCredentials);
            }
            user.password = Some(new_password.to_string());
            push_log(&mut state, &current, "UPDATE_PASSWORD", "User changed their password");
            state.logs.clone()
        };
        save_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY, &logs).await?;
        Ok(())
    }

    /// Records an action for the current user. Without a user nothing is
    /// recorded.
    pub async fn log_action(&self, action: &str, details: &str) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        let logs = {
            let mut state = self.lock();
            let Some(user) = state.current.clone() else {
                debug!("No user logged in, not recording {}", action);
                return Ok(());
            };
            push_log(&mut state, &user, action, details);
            state.logs.clone()
        };
        save_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY, &logs).await?;
        Ok(())
    }

    /// Merges external entries (ids already present are skipped), sorts the
    /// log newest first and returns how many entries were added.
    pub async fn import_logs(&self, imported: Vec<ActivityLog>) -> Result<usize, AuthError> {
        let _guard = self.write_lock.lock().await;
        let (added, logs) = {
            let mut state = self.lock();
            let fresh: Vec<ActivityLog> = imported
                .into_iter()
                .filter(|entry| !state.logs.iter().any(|l| l.id == entry.id))
                .collect();
            let added = fresh.len();
            state.logs.extend(fresh);
            state.logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            if let Some(user) = state.current.clone() {
                push_log(
                    &mut state,
                    &user,
                    "IMPORT_LOGS",
                    &format!("Imported {} external logs", added),
                );
            }
            (added, state.logs.clone())
        };
        save_json(self.storage.as_ref(), ACTIVITY_LOGS_KEY, &logs).await?;
        info!("Imported {} activity entries", added);
        Ok(added)
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RoleProvider for AuthService {
    /// No logged-in principal counts as VIEWER.
    fn current_role(&self) -> Role {
        self.lock()
            .current
            .as_ref()
            .map(|u| u.role)
            .unwrap_or(Role::Viewer)
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn require_admin(state: &AuthState) -> Result<User, AuthError> {
    match &state.current {
        Some(user) if user.role.is_admin() => Ok(user.clone()),
        Some(_) => Err(AuthError::Forbidden),
        None => Err(AuthError::NotAuthenticated),
    }
}

fn apply_update(user: &mut User, update: UserUpdate) {
    if let Some(name) = update.name {
        user.name = name;
    }
    if let Some(email) = update.email {
        user.email = email;
    }
    if let Some(password) = update.password {
        user.password = Some(password);
    }
    if let Some(role) = update.role {
        user.role = role;
    }
    if let Some(department) = update.department {
        user.department = Some(department);
    }
    if let Some(avatar) = update.avatar {
        user.avatar = avatar;
    }
}

// Newest entries go first.
fn push_log(state: &mut AuthState, user: &User, action: &str, details: &str) {
    let entry = ActivityLog {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        user_name: user.name.clone(),
        action: action.to_string(),
        details: details.to_string(),
        timestamp: Utc::now(),
        ip: ACTIVITY_IP.to_string(),
    };
    state.logs.insert(0, entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mem_storage::MemStorage;
    use chrono::Duration;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn service() -> (AuthService, Arc<MemStorage>) {
        init_logger();
        let storage = Arc::new(MemStorage::new());
        let service = AuthService::new(storage.clone(), &AuthSettings::default());
        (service, storage)
    }

    async fn login_admin(service: &AuthService) -> User {
        service.login("ADMIN@rampart.local", "admin@123").await.unwrap()
    }

    fn analyst(email: &str) -> NewUser {
        NewUser {
            name: "Sara Osman".into(),
            email: email.into(),
            password: "analyst-pass".into(),
            role: Role::Analyst,
            department: Some("SOC".into()),
        }
    }

    #[tokio::test]
    async fn anonymous_principal_is_viewer() {
        let (service, _) = service();
        assert_eq!(service.current_role(), Role::Viewer);
        assert!(!service.is_authenticated());
    }

    #[tokio::test]
    async fn login_is_case_insensitive_and_persists_safe_user() {
        let (service, storage) = service();
        let user = login_admin(&service).await;

        assert_eq!(user.role, Role::Admin);
        assert!(user.password.is_none());
        assert_eq!(service.current_role(), Role::Admin);

        let blob = storage.get(SESSION_USER_KEY).await.unwrap().unwrap();
        assert!(!blob.contains("admin@123"));
        assert_eq!(service.activity_logs()[0].action, "LOGIN");
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (service, _) = service();
        let result = service.login("admin@rampart.local", "nope").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert!(service.current_user().is_none());
    }

    #[tokio::test]
    async fn logout_clears_session_blob() {
        let (service, storage) = service();
        login_admin(&service).await;
        service.logout().await.unwrap();

        assert!(storage.get(SESSION_USER_KEY).await.unwrap().is_none());
        assert_eq!(service.current_role(), Role::Viewer);
        assert_eq!(service.activity_logs()[0].action, "LOGOUT");
    }

    #[tokio::test]
    async fn user_management_requires_admin() {
        let (service, _) = service();
        assert!(matches!(
            service.add_user(analyst("s@example.org")).await,
            Err(AuthError::NotAuthenticated)
        ));

        login_admin(&service).await;
        service.add_user(analyst("s@example.org")).await.unwrap();
        service.logout().await.unwrap();

        service.login("s@example.org", "analyst-pass").await.unwrap();
        assert_eq!(service.current_role(), Role::Analyst);
        assert!(matches!(
            service.add_user(analyst("t@example.org")).await,
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn duplicate_email_and_self_delete_are_refused() {
        let (service, _) = service();
        let admin = login_admin(&service).await;

        service.add_user(analyst("dup@example.org")).await.unwrap();
        assert!(matches!(
            service.add_user(analyst("DUP@example.org")).await,
            Err(AuthError::DuplicateEmail(_))
        ));
        assert!(matches!(
            service.delete_user(&admin.id).await,
            Err(AuthError::CannotDeleteSelf)
        ));
    }

    #[tokio::test]
    async fn update_and_delete_user() {
        let (service, _) = service();
        login_admin(&service).await;
        let user = service.add_user(analyst("a@example.org")).await.unwrap();

        let updated = service
            .update_user(
                &user.id,
                UserUpdate {
                    role: Some(Role::Viewer),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Viewer);
        assert_eq!(updated.name, "Sara Osman");

        service.delete_user(&user.id).await.unwrap();
        assert_eq!(service.users().len(), 1);
        assert!(matches!(
            service.delete_user(&user.id).await,
            Err(AuthError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn updating_current_user_refreshes_session() {
        let (service, storage) = service();
        let admin = login_admin(&service).await;
        service
            .update_user(
                &admin.id,
                UserUpdate {
                    name: Some("Chief".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(service.current_user().unwrap().name, "Chief");
        let stored: User = load_json(storage.as_ref(), SESSION_USER_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Chief");
    }

    #[tokio::test]
    async fn password_change_needs_the_old_password() {
        let (service, _) = service();
        assert!(matches!(
            service.update_password("admin@123", "x").await,
            Err(AuthError::NotAuthenticated)
        ));
        login_admin(&service).await;
        assert!(matches!(
            service.update_password("wrong", "x").await,
            Err(AuthError::InvalidCredentials)
        ));
        service.update_password("admin@123", "n3w").await.unwrap();
        service.logout().await.unwrap();
        service.login("admin@rampart.local", "n3w").await.unwrap();
    }

    #[tokio::test]
    async fn import_merges_by_id_and_sorts_newest_first() {
        let (service, _) = service();
        let admin = login_admin(&service).await;
        let existing_id = service.activity_logs()[0].id.clone();

        let old = ActivityLog {
            id: "ext-1".into(),
            user_id: "x".into(),
            user_name: "External".into(),
            action: "SCAN".into(),
            details: "imported".into(),
            timestamp: Utc::now() - Duration::days(2),
            ip: "10.0.0.1".into(),
        };
        let duplicate = ActivityLog {
            id: existing_id,
            ..old.clone()
        };

        let added = service.import_logs(vec![old, duplicate]).await.unwrap();
        assert_eq!(added, 1);

        let logs = service.activity_logs();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].action, "IMPORT_LOGS");
        assert_eq!(logs[0].user_id, admin.id);
        assert_eq!(logs[2].id, "ext-1");
        assert!(logs.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[tokio::test]
    async fn log_action_without_user_is_a_no_op() {
        let (service, storage) = service();
        service.log_action("EXPORT", "records").await.unwrap();
        assert!(service.activity_logs().is_empty());
        assert!(storage.get(ACTIVITY_LOGS_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_picks_up_persisted_session_by_email() {
        let (first, storage) = service();
        login_admin(&first).await;

        // A fresh service seeds a new admin id; the session is matched by email.
        let second = AuthService::new(storage.clone(), &AuthSettings::default());
        second.restore().await.unwrap();
        assert_eq!(second.current_role(), Role::Admin);
        assert_eq!(second.activity_logs().len(), 1);
    }

    #[tokio::test]
    async fn restore_drops_unknown_session_user() {
        let (service, storage) = service();
        let stranger = User {
            id: "ghost".into(),
            name: "Ghost".into(),
            email: "ghost@example.org".into(),
            password: None,
            role: Role::Admin,
            department: None,
            avatar: "GH".into(),
        };
        save_json(storage.as_ref(), SESSION_USER_KEY, &stranger).await.unwrap();

        service.restore().await.unwrap();
        assert!(service.current_user().is_none());
        assert!(storage.get(SESSION_USER_KEY).await.unwrap().is_none());
    }
}
