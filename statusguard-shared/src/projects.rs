/// Project and incident operations
///
/// Every operation runs the resource guard on the transaction that performs
/// it. Creations are quota-checked there as well: the guard locks the quota
/// scope row, counts, and the insert follows on the same transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::audit::AuditTarget;
use crate::auth::authorization::{Operation, ResourceRef};
use crate::auth::identity::Identity;
use crate::db::retry::with_retry;
use crate::engine::Engine;
use crate::error::{Denial, Error, Result};
use crate::models::incident::{CreateIncident, Incident};
use crate::models::project::{CreateProject, Project, UpdateProject};

/// Input for a new project
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewProject {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,

    /// Owning group; None creates a personal project
    #[serde(default)]
    pub group_id: Option<Uuid>,

    #[serde(default)]
    pub is_public: bool,
}

/// Input for a new incident
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewIncident {
    pub project_id: Uuid,

    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 5000, message = "description must be at most 5000 characters"))]
    #[serde(default)]
    pub description: String,

    /// Set for scheduled maintenance
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
}

fn validate_changes(changes: &UpdateProject) -> Result<UpdateProject> {
    let name = changes.name.as_deref().map(str::trim);
    if let Some(name) = name {
        if name.is_empty() || name.chars().count() > 200 {
            return Err(Error::Invalid(
                "name must be 1-200 characters".to_string(),
            ));
        }
    }

    Ok(UpdateProject {
        name: name.map(str::to_string),
        is_public: changes.is_public,
    })
}

#[derive(Clone, Copy)]
pub struct ProjectService<'a> {
    engine: &'a Engine,
}

impl<'a> ProjectService<'a> {
    pub(crate) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Creates a personal or group project within the tier quota
    ///
    /// # Errors
    ///
    /// - `QuotaExceeded` when the quota scope is full
    /// - `NotFound` for a group the actor can't see
    pub async fn create_project(&self, actor: &Identity, input: NewProject) -> Result<Project> {
        let input = NewProject {
            name: input.name.trim().to_string(),
            ..input
        };
        let resource = ResourceRef::NewProject {
            group_id: input.group_id,
        };

        let result = match input.validate() {
            Ok(()) => {
                with_retry(self.engine.retry_policy(), "create_project", || {
                    self.try_create_project(actor, &input, &resource)
                })
                .await
            }
            Err(errors) => Err(errors.into()),
        };

        self.engine
            .decisions()
            .observe(actor, "create_project", AuditTarget::from(&resource), result)
            .await
    }

    async fn try_create_project(
        &self,
        actor: &Identity,
        input: &NewProject,
        resource: &ResourceRef,
    ) -> Result<Project> {
        let mut tx = self.engine.db().begin().await?;

        self.engine
            .guard()
            .authorize(&mut tx, actor, Operation::Create, resource)
            .await?;

        let project = Project::insert(
            &mut *tx,
            CreateProject {
                name: input.name.clone(),
                owner_user_id: actor.user_id,
                group_id: input.group_id,
                is_public: input.is_public,
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            project_id = %project.id,
            owner_id = %actor.user_id,
            group_id = ?project.group_id,
            "Project created"
        );
        Ok(project)
    }

    pub async fn get_project(&self, actor: &Identity, project_id: Uuid) -> Result<Project> {
        let resource = ResourceRef::Project(project_id);
        let result = self.try_get_project(actor, project_id, &resource).await;

        self.engine
            .decisions()
            .observe(actor, "get_project", AuditTarget::from(&resource), result)
            .await
    }

    async fn try_get_project(
        &self,
        actor: &Identity,
        project_id: Uuid,
        resource: &ResourceRef,
    ) -> Result<Project> {
        let mut conn = self.engine.db().acquire().await?;
        self.engine
            .guard()
            .authorize(&mut conn, actor, Operation::Read, resource)
            .await?;

        Ok(Project::find_by_id(&mut *conn, project_id)
            .await?
            .ok_or(Denial::NotFound)?)
    }

    /// Personal projects plus projects of the actor's active groups
    pub async fn list_projects(&self, actor: &Identity) -> Result<Vec<Project>> {
        actor.require_active()?;
        Ok(Project::list_visible(self.engine.db(), actor.user_id).await?)
    }

    /// Renames a project or changes its visibility
    ///
    /// Requires ownership of a personal project or admin in the owning group.
    pub async fn update_project(
        &self,
        actor: &Identity,
        project_id: Uuid,
        changes: UpdateProject,
    ) -> Result<Project> {
        let resource = ResourceRef::Project(project_id);

        let result = match validate_changes(&changes) {
            Ok(changes) => {
                with_retry(self.engine.retry_policy(), "update_project", || {
                    self.try_update_project(actor, project_id, &changes, &resource)
                })
                .await
            }
            Err(err) => Err(err),
        };

        self.engine
            .decisions()
            .observe(actor, "update_project", AuditTarget::from(&resource), result)
            .await
    }

    async fn try_update_project(
        &self,
        actor: &Identity,
        project_id: Uuid,
        changes: &UpdateProject,
        resource: &ResourceRef,
    ) -> Result<Project> {
        let mut tx = self.engine.db().begin().await?;

        self.engine
            .guard()
            .authorize(&mut tx, actor, Operation::Update, resource)
            .await?;

        let project = Project::update(&mut *tx, project_id, changes)
            .await?
            .ok_or(Denial::NotFound)?;

        tx.commit().await?;
        Ok(project)
    }

    pub async fn list_incidents(&self, actor: &Identity, project_id: Uuid) -> Result<Vec<Incident>> {
        let resource = ResourceRef::Project(project_id);
        let result = self.try_list_incidents(actor, project_id, &resource).await;

        self.engine
            .decisions()
            .observe(actor, "list_incidents", AuditTarget::from(&resource), result)
            .await
    }

    async fn try_list_incidents(
        &self,
        actor: &Identity,
        project_id: Uuid,
        resource: &ResourceRef,
    ) -> Result<Vec<Incident>> {
        let mut conn = self.engine.db().acquire().await?;
        self.engine
            .guard()
            .authorize(&mut conn, actor, Operation::Read, resource)
            .await?;

        Ok(Incident::list_by_project(&mut *conn, project_id).await?)
    }

    /// Opens an incident within the per-project quota
    pub async fn create_incident(&self, actor: &Identity, input: NewIncident) -> Result<Incident> {
        let input = NewIncident {
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            ..input
        };
        let resource = ResourceRef::NewIncident {
            project_id: input.project_id,
        };

        let result = match input.validate() {
            Ok(()) => {
                with_retry(self.engine.retry_policy(), "create_incident", || {
                    self.try_create_incident(actor, &input, &resource)
                })
                .await
            }
            Err(errors) => Err(errors.into()),
        };

        self.engine
            .decisions()
            .observe(actor, "create_incident", AuditTarget::from(&resource), result)
            .await
    }

    async fn try_create_incident(
        &self,
        actor: &Identity,
        input: &NewIncident,
        resource: &ResourceRef,
    ) -> Result<Incident> {
        let mut tx = self.engine.db().begin().await?;

        self.engine
            .guard()
            .authorize(&mut tx, actor, Operation::Create, resource)
            .await?;

        let incident = Incident::insert(
            &mut *tx,
            CreateIncident {
                project_id: input.project_id,
                title: input.title.clone(),
                description: input.description.clone(),
                scheduled_start: input.scheduled_start,
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            incident_id = %incident.id,
            project_id = %incident.project_id,
            actor_id = %actor.user_id,
            "Incident created"
        );
        Ok(incident)
    }

    /// Resolves an open incident
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the incident is already resolved.
    pub async fn resolve_incident(&self, actor: &Identity, incident_id: Uuid) -> Result<Incident> {
        let resource = ResourceRef::Incident(incident_id);

        let result = with_retry(self.engine.retry_policy(), "resolve_incident", || {
            self.try_resolve_incident(actor, incident_id, &resource)
        })
        .await;

        self.engine
            .decisions()
            .observe(actor, "resolve_incident", AuditTarget::from(&resource), result)
            .await
    }

    async fn try_resolve_incident(
        &self,
        actor: &Identity,
        incident_id: Uuid,
        resource: &ResourceRef,
    ) -> Result<Incident> {
        let mut tx = self.engine.db().begin().await?;

        self.engine
            .guard()
            .authorize(&mut tx, actor, Operation::Resolve, resource)
            .await?;

        let incident = Incident::resolve(&mut *tx, incident_id, Utc::now())
            .await?
            .ok_or(Denial::InvalidTransition)?;

        tx.commit().await?;

        info!(%incident_id, actor_id = %actor.user_id, "Incident resolved");
        Ok(incident)
    }
}
