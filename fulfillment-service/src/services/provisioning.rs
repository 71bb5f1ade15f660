//! Identity-side provisioning: domains, projects, users, role bindings
//! and server quiesce operations.

use connector_core::backends::{ComputeBackend, IdentityBackend};
use connector_core::error::ConnectorError;
use connector_core::models::{
    format_report_time, start_of_day, Domain, NewProject, NewUser, Project, ProjectUpdate, User,
    UserUpdate,
};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Pseudo-random password for freshly created users.
pub fn pwgen(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length).map(|_| rng.sample(Alphanumeric) as char).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    Stop,
    Shelve,
}

impl ServerAction {
    fn as_str(&self) -> &'static str {
        match self {
            ServerAction::Stop => "stop",
            ServerAction::Shelve => "shelve",
        }
    }

    /// Server statuses the action is valid for.
    fn applicable_statuses(&self) -> &'static [&'static str] {
        match self {
            ServerAction::Stop => &["ACTIVE", "ERROR"],
            ServerAction::Shelve => &["ACTIVE", "SHUTOFF", "STOPPED", "PAUSED", "SUSPENDED"],
        }
    }
}

pub struct Provisioner {
    identity: Arc<dyn IdentityBackend>,
    compute: Arc<dyn ComputeBackend>,
}

impl Provisioner {
    pub fn new(identity: Arc<dyn IdentityBackend>, compute: Arc<dyn ComputeBackend>) -> Self {
        Self { identity, compute }
    }

    /// Find a manually pre-created domain by its description, which
    /// carries the tier-1 partner id.
    pub async fn find_domain_by_description(
        &self,
        partner_id: &str,
    ) -> Result<Option<Domain>, ConnectorError> {
        let domains = self.identity.list_domains(None).await?;
        Ok(domains
            .into_iter()
            .find(|d| d.description.as_deref() == Some(partner_id)))
    }

    /// Resolve the customer's domain, creating it when missing. A
    /// create conflict means another run won the race; the domain is
    /// re-listed and updated instead.
    pub async fn create_or_update_domain(
        &self,
        name: &str,
        description: Option<&str>,
        domain_id: Option<&str>,
    ) -> Result<Domain, ConnectorError> {
        let mut domain = None;
        if let Some(domain_id) = domain_id {
            match self.identity.get_domain(domain_id).await {
                Ok(found) => domain = Some(found),
                // domain was removed
                Err(ConnectorError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if domain.is_none() {
            domain = self.identity.list_domains(Some(name)).await?.into_iter().next();
        }
        if domain.is_none() {
            match self.identity.create_domain(name, description, true).await {
                Ok(created) => return Ok(created),
                Err(ConnectorError::Conflict(_)) => {
                    // race protection
                    domain = self.identity.list_domains(Some(name)).await?.into_iter().next();
                }
                Err(e) => return Err(e),
            }
        }

        let domain = domain.ok_or_else(|| {
            ConnectorError::Conflict(format!("domain \"{name}\" vanished during creation"))
        })?;
        self.identity
            .update_domain(&domain.id, name, description, true)
            .await
    }

    /// Create the asset's project, disabled until quotas are in place.
    ///
    /// A `project_id` parameter makes this idempotent: the stored id is
    /// fetched instead of creating, and a dangling id yields `None`.
    /// Fresh projects start their usage-report clock at today's
    /// midnight, pre-confirmed so the first cycle reports a full day.
    pub async fn create_project(
        &self,
        project_id: Option<&str>,
        name: &str,
        domain_id: &str,
        description: &str,
    ) -> Result<Option<Project>, ConnectorError> {
        if let Some(project_id) = project_id {
            return match self.identity.get_project(project_id).await {
                Ok(project) => Ok(Some(project)),
                // project was removed
                Err(ConnectorError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            };
        }

        let report_time = format_report_time(start_of_day(Utc::now()));
        let new_project = NewProject {
            name: name.to_string(),
            domain_id: domain_id.to_string(),
            description: Some(description.to_string()),
            enabled: false,
            last_usage_report_time: Some(report_time.clone()),
            start_usage_report_time: Some(report_time),
            last_usage_report_confirmed: Some(true),
        };
        match self.identity.create_project(&new_project).await {
            Ok(project) => Ok(Some(project)),
            Err(ConnectorError::Conflict(_)) | Err(ConnectorError::BadRequest(_)) => {
                warn!(name, "Project name rejected by the identity service");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Create the asset's user, or re-enable it when its stored id
    /// still resolves. Name conflicts yield `None` for the caller to
    /// turn into an inquire outcome.
    pub async fn create_user(
        &self,
        user_id: Option<&str>,
        name: &str,
        domain_id: &str,
        password: SecretString,
        description: &str,
    ) -> Result<Option<User>, ConnectorError> {
        if let Some(user_id) = user_id {
            match self
                .identity
                .update_user(
                    user_id,
                    &UserUpdate {
                        enabled: Some(true),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(user) => return Ok(Some(user)),
                // user was removed, fall through to create
                Err(ConnectorError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let new_user = NewUser {
            name: name.to_string(),
            domain_id: domain_id.to_string(),
            password,
            description: Some(description.to_string()),
            enabled: true,
        };
        match self.identity.create_user(&new_user).await {
            Ok(user) => Ok(Some(user)),
            Err(ConnectorError::Conflict(_)) | Err(ConnectorError::BadRequest(_)) => {
                warn!(name, "User name or password rejected by the identity service");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Make the user's role bindings on the project exactly `roles`:
    /// extra bindings are revoked, desired ones granted.
    pub async fn reconcile_roles(
        &self,
        user_id: &str,
        project_id: &str,
        roles: &[&str],
    ) -> Result<(), ConnectorError> {
        let mut desired = Vec::with_capacity(roles.len());
        for role in roles {
            desired.push(self.identity.find_role(role).await?.id);
        }
        let current = self.identity.list_role_assignments(user_id, project_id).await?;

        for role_id in current.iter().filter(|r| !desired.contains(r)) {
            self.identity.revoke_role(role_id, user_id, project_id).await?;
        }
        for role_id in &desired {
            self.identity.grant_role(role_id, user_id, project_id).await?;
        }
        Ok(())
    }

    /// Disable the user. An already-deleted user is fine.
    pub async fn suspend_user(&self, user_id: Option<&str>, description: Option<&str>) {
        let Some(user_id) = user_id else {
            error!("User id not specified");
            return;
        };
        let update = UserUpdate {
            enabled: Some(false),
            description: description.map(str::to_string),
        };
        match self.identity.update_user(user_id, &update).await {
            Ok(_) | Err(ConnectorError::NotFound(_)) => {}
            Err(error) => error!(user_id, error = %error, "Unable to suspend user"),
        }
    }

    /// Disable the project and close the usage-reporting interval.
    /// The stop marker is stamped only on the first suspension; an
    /// asset already suspended upstream keeps its original stop time.
    pub async fn suspend_project(
        &self,
        project_id: Option<&str>,
        already_suspended: bool,
        description: Option<&str>,
    ) {
        let Some(project_id) = project_id else {
            error!("Project id not specified");
            return;
        };
        let mut update = ProjectUpdate {
            enabled: Some(false),
            description: description.map(str::to_string),
            ..Default::default()
        };
        if !already_suspended {
            let now = Utc::now();
            update.stop_usage_report_time = Some(Some(format_report_time(now)));
        }
        match self.identity.update_project(project_id, &update).await {
            Ok(_) | Err(ConnectorError::NotFound(_)) => {}
            Err(error) => error!(project_id, error = %error, "Unable to suspend project"),
        }
    }

    /// Stop or shelve every server of the project that is in a status
    /// the action applies to. Per-server failures are logged and do not
    /// stop the sweep.
    pub async fn operate_servers(
        &self,
        project_id: Option<&str>,
        action: ServerAction,
        description: Option<&str>,
    ) -> Result<(), ConnectorError> {
        let Some(project_id) = project_id else {
            error!("Project id not specified");
            return Ok(());
        };

        let servers = self.compute.list_servers(project_id).await?;
        for server in &servers {
            if !action.applicable_statuses().contains(&server.status.as_str()) {
                warn!(
                    server_id = %server.id,
                    server_name = %server.name,
                    status = %server.status,
                    action = action.as_str(),
                    "Server status does not allow the action"
                );
                continue;
            }

            let result = async {
                if let Some(description) = description {
                    self.compute
                        .set_server_description(&server.id, description)
                        .await?;
                }
                match action {
                    ServerAction::Stop => self.compute.stop_server(&server.id).await,
                    ServerAction::Shelve => self.compute.shelve_server(&server.id).await,
                }
            }
            .await;

            match result {
                Ok(()) => info!(
                    server_id = %server.id,
                    action = action.as_str(),
                    "Server operation applied"
                ),
                Err(error) => error!(
                    server_id = %server.id,
                    server_name = %server.name,
                    action = action.as_str(),
                    error = %error,
                    "Server operation failed"
                ),
            }
        }
        Ok(())
    }
}
