//! Identity service client (domains, projects, users, role bindings).

use crate::backends::IdentityBackend;
use crate::clients::session::IdentitySession;
use crate::error::ConnectorError;
use crate::models::{
    Domain, NewProject, NewUser, Project, ProjectUpdate, Role, User, UserUpdate,
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::instrument;

pub struct IdentityClient {
    session: Arc<IdentitySession>,
}

#[derive(Debug, Deserialize)]
struct DomainWire {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct ProjectWire {
    id: String,
    name: String,
    domain_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    enabled: bool,
    // Report-state metadata stored as project extras.
    #[serde(default)]
    last_usage_report_time: Option<String>,
    #[serde(default)]
    last_usage_report_confirmed: Option<bool>,
    #[serde(default)]
    start_usage_report_time: Option<String>,
    #[serde(default)]
    stop_usage_report_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserWire {
    id: String,
    name: String,
    domain_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    enabled: bool,
}

impl From<DomainWire> for Domain {
    fn from(w: DomainWire) -> Self {
        Domain {
            id: w.id,
            name: w.name,
            description: w.description,
            enabled: w.enabled,
        }
    }
}

impl From<ProjectWire> for Project {
    fn from(w: ProjectWire) -> Self {
        Project {
            id: w.id,
            name: w.name,
            domain_id: w.domain_id,
            description: w.description,
            enabled: w.enabled,
            last_usage_report_time: w.last_usage_report_time,
            last_usage_report_confirmed: w.last_usage_report_confirmed,
            start_usage_report_time: w.start_usage_report_time,
            stop_usage_report_time: w.stop_usage_report_time,
        }
    }
}

impl From<UserWire> for User {
    fn from(w: UserWire) -> Self {
        User {
            id: w.id,
            name: w.name,
            domain_id: w.domain_id,
            description: w.description,
            enabled: w.enabled,
        }
    }
}

impl IdentityClient {
    pub fn new(session: Arc<IdentitySession>) -> Self {
        Self { session }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.session.identity_endpoint(), path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Value, ConnectorError> {
        crate::clients::send_authed(&self.session, request, context).await
    }

    fn parse<T: serde::de::DeserializeOwned>(
        value: Value,
        context: &str,
    ) -> Result<T, ConnectorError> {
        serde_json::from_value(value)
            .map_err(|e| ConnectorError::Internal(anyhow::anyhow!("{context}: {e}")))
    }
}

/// Build the JSON body of a partial project update. Report-state fields
/// marked `Some(None)` are written as empty strings, which is how the
/// identity store clears extras.
fn project_update_body(update: &ProjectUpdate) -> Value {
    let mut body = Map::new();
    if let Some(enabled) = update.enabled {
        body.insert("enabled".to_string(), Value::Bool(enabled));
    }
    if let Some(description) = &update.description {
        body.insert("description".to_string(), Value::String(description.clone()));
    }
    if let Some(confirmed) = update.last_usage_report_confirmed {
        body.insert(
            "last_usage_report_confirmed".to_string(),
            Value::Bool(confirmed),
        );
    }
    for (key, field) in [
        ("last_usage_report_time", &update.last_usage_report_time),
        ("start_usage_report_time", &update.start_usage_report_time),
        ("stop_usage_report_time", &update.stop_usage_report_time),
    ] {
        if let Some(value) = field {
            body.insert(
                key.to_string(),
                Value::String(value.clone().unwrap_or_default()),
            );
        }
    }
    json!({ "project": Value::Object(body) })
}

#[async_trait]
impl IdentityBackend for IdentityClient {
    async fn get_domain(&self, domain_id: &str) -> Result<Domain, ConnectorError> {
        let body = self
            .send(
                self.session.http().get(self.url(&format!("/domains/{domain_id}"))),
                "get domain",
            )
            .await?;
        Ok(Self::parse::<DomainWire>(body["domain"].clone(), "get domain")?.into())
    }

    async fn list_domains(&self, name: Option<&str>) -> Result<Vec<Domain>, ConnectorError> {
        let mut request = self.session.http().get(self.url("/domains"));
        if let Some(name) = name {
            request = request.query(&[("name", name)]);
        }
        let body = self.send(request, "list domains").await?;
        let wires: Vec<DomainWire> = Self::parse(body["domains"].clone(), "list domains")?;
        Ok(wires.into_iter().map(Into::into).collect())
    }

    async fn create_domain(
        &self,
        name: &str,
        description: Option<&str>,
        enabled: bool,
    ) -> Result<Domain, ConnectorError> {
        let payload = json!({
            "domain": {"name": name, "description": description, "enabled": enabled}
        });
        let body = self
            .send(
                self.session.http().post(self.url("/domains")).json(&payload),
                "create domain",
            )
            .await?;
        Ok(Self::parse::<DomainWire>(body["domain"].clone(), "create domain")?.into())
    }

    async fn update_domain(
        &self,
        domain_id: &str,
        name: &str,
        description: Option<&str>,
        enabled: bool,
    ) -> Result<Domain, ConnectorError> {
        let payload = json!({
            "domain": {"name": name, "description": description, "enabled": enabled}
        });
        let body = self
            .send(
                self.session
                    .http()
                    .patch(self.url(&format!("/domains/{domain_id}")))
                    .json(&payload),
                "update domain",
            )
            .await?;
        Ok(Self::parse::<DomainWire>(body["domain"].clone(), "update domain")?.into())
    }

    #[instrument(skip(self))]
    async fn get_project(&self, project_id: &str) -> Result<Project, ConnectorError> {
        let body = self
            .send(
                self.session
                    .http()
                    .get(self.url(&format!("/projects/{project_id}"))),
                "get project",
            )
            .await?;
        Ok(Self::parse::<ProjectWire>(body["project"].clone(), "get project")?.into())
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project, ConnectorError> {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(project.name.clone()));
        body.insert(
            "domain_id".to_string(),
            Value::String(project.domain_id.clone()),
        );
        body.insert("enabled".to_string(), Value::Bool(project.enabled));
        if let Some(description) = &project.description {
            body.insert("description".to_string(), Value::String(description.clone()));
        }
        if let Some(t) = &project.last_usage_report_time {
            body.insert("last_usage_report_time".to_string(), Value::String(t.clone()));
        }
        if let Some(t) = &project.start_usage_report_time {
            body.insert("start_usage_report_time".to_string(), Value::String(t.clone()));
        }
        if let Some(c) = project.last_usage_report_confirmed {
            body.insert("last_usage_report_confirmed".to_string(), Value::Bool(c));
        }
        let payload = json!({ "project": Value::Object(body) });
        let body = self
            .send(
                self.session.http().post(self.url("/projects")).json(&payload),
                "create project",
            )
            .await?;
        Ok(Self::parse::<ProjectWire>(body["project"].clone(), "create project")?.into())
    }

    async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<Project, ConnectorError> {
        let payload = project_update_body(update);
        let body = self
            .send(
                self.session
                    .http()
                    .patch(self.url(&format!("/projects/{project_id}")))
                    .json(&payload),
                "update project",
            )
            .await?;
        Ok(Self::parse::<ProjectWire>(body["project"].clone(), "update project")?.into())
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), ConnectorError> {
        self.send(
            self.session
                .http()
                .delete(self.url(&format!("/projects/{project_id}"))),
            "delete project",
        )
        .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<User, ConnectorError> {
        let body = self
            .send(
                self.session.http().get(self.url(&format!("/users/{user_id}"))),
                "get user",
            )
            .await?;
        Ok(Self::parse::<UserWire>(body["user"].clone(), "get user")?.into())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, ConnectorError> {
        let payload = json!({
            "user": {
                "name": user.name,
                "domain_id": user.domain_id,
                "password": user.password.expose_secret(),
                "description": user.description,
                "enabled": user.enabled,
            }
        });
        let body = self
            .send(
                self.session.http().post(self.url("/users")).json(&payload),
                "create user",
            )
            .await?;
        Ok(Self::parse::<UserWire>(body["user"].clone(), "create user")?.into())
    }

    async fn update_user(
        &self,
        user_id: &str,
        update: &UserUpdate,
    ) -> Result<User, ConnectorError> {
        let mut body = Map::new();
        if let Some(enabled) = update.enabled {
            body.insert("enabled".to_string(), Value::Bool(enabled));
        }
        if let Some(description) = &update.description {
            body.insert("description".to_string(), Value::String(description.clone()));
        }
        let payload = json!({ "user": Value::Object(body) });
        let body = self
            .send(
                self.session
                    .http()
                    .patch(self.url(&format!("/users/{user_id}")))
                    .json(&payload),
                "update user",
            )
            .await?;
        Ok(Self::parse::<UserWire>(body["user"].clone(), "update user")?.into())
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), ConnectorError> {
        self.send(
            self.session.http().delete(self.url(&format!("/users/{user_id}"))),
            "delete user",
        )
        .await?;
        Ok(())
    }

    async fn find_role(&self, name: &str) -> Result<Role, ConnectorError> {
        let body = self
            .send(
                self.session
                    .http()
                    .get(self.url("/roles"))
                    .query(&[("name", name)]),
                "find role",
            )
            .await?;
        let roles = body["roles"].as_array().cloned().unwrap_or_default();
        let role = roles
            .first()
            .ok_or_else(|| ConnectorError::NotFound(format!("role \"{name}\"")))?;
        Ok(Role {
            id: role["id"].as_str().unwrap_or_default().to_string(),
            name: role["name"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn list_role_assignments(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<Vec<String>, ConnectorError> {
        let body = self
            .send(
                self.session
                    .http()
                    .get(self.url("/role_assignments"))
                    .query(&[("user.id", user_id), ("scope.project.id", project_id)]),
                "list role assignments",
            )
            .await?;
        let assignments = body["role_assignments"].as_array().cloned().unwrap_or_default();
        Ok(assignments
            .iter()
            .filter_map(|a| a["role"]["id"].as_str().map(str::to_string))
            .collect())
    }

    async fn grant_role(
        &self,
        role_id: &str,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ConnectorError> {
        self.send(
            self.session.http().put(
                self.url(&format!("/projects/{project_id}/users/{user_id}/roles/{role_id}")),
            ),
            "grant role",
        )
        .await?;
        Ok(())
    }

    async fn revoke_role(
        &self,
        role_id: &str,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ConnectorError> {
        self.send(
            self.session.http().delete(
                self.url(&format!("/projects/{project_id}/users/{user_id}/roles/{role_id}")),
            ),
            "revoke role",
        )
        .await?;
        Ok(())
    }
}
