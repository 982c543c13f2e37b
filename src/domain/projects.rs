use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clean_opt, tax, Role};

pub const MAX_TITLE_CHARS: usize = 200;

/// Project status
///
/// `draft → submitted → design_in_progress → quoted → accepted → in_progress →
/// completed`, with `cancelled` reachable until work starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Submitted,
    DesignInProgress,
    Quoted,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

text_enum!(ProjectStatus {
    Draft => "draft",
    Submitted => "submitted",
    DesignInProgress => "design_in_progress",
    Quoted => "quoted",
    Accepted => "accepted",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// Who drives a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// A user acting through `PATCH /projects/:id/status`
    User(Role),
    /// A side effect of another operation (assignment, quotation send/accept/reject)
    System,
}

impl ProjectStatus {
    /// Details (title, address, measurements...) are frozen once submitted.
    pub fn is_editable(self) -> bool {
        self == Self::Draft
    }

    /// Sellers may browse and quote on projects in these states.
    pub fn is_open_for_quotation(self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::DesignInProgress | Self::Quoted
        )
    }

    /// Designers may attach suggestions in these states.
    pub fn accepts_suggestions(self) -> bool {
        self.is_open_for_quotation()
    }

    /// A designer can be picked while drafting or while waiting on one.
    pub fn accepts_designer(self) -> bool {
        matches!(self, Self::Draft | Self::Submitted)
    }

    /// Status a designer assignment moves the project to. Drafts stay put
    /// and move on submit instead.
    pub fn on_designer_assigned(self) -> Option<ProjectStatus> {
        match self {
            Self::Submitted => Some(Self::DesignInProgress),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `actor` may move a project from `self` to `to`.
    pub fn can_transition(self, to: ProjectStatus, actor: Actor) -> bool {
        use ProjectStatus::*;

        match (self, to, actor) {
            (Draft, Submitted, Actor::User(Role::Customer)) => true,
            (Draft | Submitted | DesignInProgress | Quoted, Cancelled, by) => {
                by == Actor::User(Role::Customer)
            }
            (Accepted, InProgress, Actor::User(Role::Seller)) => true,
            (InProgress, Completed, Actor::User(Role::Seller)) => true,
            (Submitted, DesignInProgress, Actor::System) => true,
            (Submitted | DesignInProgress, Quoted, Actor::System) => true,
            (Quoted, Submitted, Actor::System) => true,
            (Quoted, Accepted, Actor::System) => true,
            _ => false,
        }
    }

    /// Statuses `role` could request from here, for UI hints.
    pub fn next_for(self, role: Role) -> Vec<ProjectStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|to| self.can_transition(*to, Actor::User(role)))
            .collect()
    }
}

/// Database row for a project
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub designer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub property_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state_code: Option<String>,
    pub budget: Option<Decimal>,
    pub status: String,
    pub accepted_quotation_id: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const PROJECT_COLUMNS: &str = "id, customer_id, designer_id, seller_id, title, description, \
    property_type, address, city, state_code, budget, status, accepted_quotation_id, \
    submitted_at, created_at, updated_at";

/// Project entity
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub designer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub property_type: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state_code: Option<String>,
    pub budget: Option<Decimal>,
    pub status: ProjectStatus,
    pub accepted_quotation_id: Option<Uuid>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            status: row.status.parse().unwrap_or_default(),
            id: row.id,
            customer_id: row.customer_id,
            designer_id: row.designer_id,
            seller_id: row.seller_id,
            title: row.title,
            description: row.description,
            property_type: row.property_type,
            address: row.address,
            city: row.city,
            state_code: row.state_code,
            budget: row.budget,
            accepted_quotation_id: row.accepted_quotation_id,
            submitted_at: row.submitted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl Project {
    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.customer_id == user_id
    }

    pub fn is_assigned_designer(&self, user_id: Uuid) -> bool {
        self.designer_id == Some(user_id)
    }

    pub fn is_accepted_seller(&self, user_id: Uuid) -> bool {
        self.seller_id == Some(user_id)
    }

    /// Read access: owner, assigned designer, accepted seller, or any seller
    /// while the project is open for quotation.
    pub fn can_view(&self, user_id: Uuid, role: Role) -> bool {
        match role {
            Role::Customer => self.is_owner(user_id),
            Role::Designer => self.is_assigned_designer(user_id),
            Role::Seller => {
                self.is_accepted_seller(user_id) || self.status.is_open_for_quotation()
            }
        }
    }

    /// Statuses this caller may request through the status endpoint.
    pub fn transitions_for(&self, user_id: Uuid, role: Role) -> Vec<ProjectStatus> {
        let acts = match role {
            Role::Customer => self.is_owner(user_id),
            Role::Seller => self.is_accepted_seller(user_id),
            Role::Designer => false,
        };
        if acts {
            self.status.next_for(role)
        } else {
            Vec::new()
        }
    }

    /// Users other than `actor` that should hear about changes to this project.
    pub fn stakeholders_except(&self, actor: Uuid) -> Vec<Uuid> {
        [Some(self.customer_id), self.designer_id, self.seller_id]
            .into_iter()
            .flatten()
            .filter(|id| *id != actor)
            .collect()
    }
}

/// Request DTO for creating a project
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub budget: Option<Decimal>,
}

/// Request DTO for updating a draft project
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub budget: Option<Decimal>,
}

fn check_title(title: &str) -> Result<(), (&'static str, String)> {
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err((
            "title",
            format!("Title must be 1-{} characters", MAX_TITLE_CHARS),
        ));
    }
    Ok(())
}

fn check_location(
    state_code: &Option<String>,
    budget: Option<Decimal>,
) -> Result<(), (&'static str, String)> {
    if let Some(code) = state_code {
        if !tax::validate_state_code(code) {
            return Err(("state_code", "Invalid GST state code".to_string()));
        }
    }
    if budget.is_some_and(|b| b.is_sign_negative()) {
        return Err(("budget", "Budget cannot be negative".to_string()));
    }
    Ok(())
}

impl CreateProjectRequest {
    pub fn validate(self) -> Result<Self, (&'static str, String)> {
        let title = self.title.trim().to_string();
        check_title(&title)?;
        let state_code = clean_opt(self.state_code);
        check_location(&state_code, self.budget)?;
        Ok(Self {
            title,
            description: clean_opt(self.description),
            property_type: clean_opt(self.property_type),
            address: clean_opt(self.address),
            city: clean_opt(self.city),
            state_code,
            budget: self.budget,
        })
    }
}

impl UpdateProjectRequest {
    pub fn validate(self) -> Result<Self, (&'static str, String)> {
        let title = self.title.map(|t| t.trim().to_string());
        if let Some(t) = &title {
            check_title(t)?;
        }
        let state_code = clean_opt(self.state_code);
        check_location(&state_code, self.budget)?;
        Ok(Self {
            title,
            description: clean_opt(self.description),
            property_type: clean_opt(self.property_type),
            address: clean_opt(self.address),
            city: clean_opt(self.city),
            state_code,
            budget: self.budget,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignDesignerRequest {
    pub designer_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProjectListQuery {
    #[serde(default)]
    pub status: Option<ProjectStatus>,
}

/// Project with counts, returned by detail endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub measurement_count: i64,
    pub image_count: i64,
    pub allowed_transitions: Vec<ProjectStatus>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectStatus::*;

    fn project(status: ProjectStatus) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            designer_id: None,
            seller_id: None,
            title: "2BHK refresh".into(),
            description: None,
            property_type: None,
            address: None,
            city: None,
            state_code: None,
            budget: None,
            status,
            accepted_quotation_id: None,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_drafts_are_editable() {
        assert!(Draft.is_editable());
        for status in ProjectStatus::ALL.iter().filter(|s| **s != Draft) {
            assert!(!status.is_editable(), "{status} should be locked");
        }
    }

    #[test]
    fn customer_transitions() {
        let customer = Actor::User(Role::Customer);
        assert!(Draft.can_transition(Submitted, customer));
        assert!(Quoted.can_transition(Cancelled, customer));
        assert!(!Accepted.can_transition(Cancelled, customer));
        assert!(!Submitted.can_transition(Draft, customer));
        assert!(!Quoted.can_transition(Accepted, customer));
    }

    #[test]
    fn seller_drives_execution() {
        let seller = Actor::User(Role::Seller);
        assert!(Accepted.can_transition(InProgress, seller));
        assert!(InProgress.can_transition(Completed, seller));
        assert!(!Accepted.can_transition(Completed, seller));
        assert!(!Draft.can_transition(Submitted, seller));
    }

    #[test]
    fn designers_cannot_change_status_directly() {
        for from in ProjectStatus::ALL {
            assert!(from.next_for(Role::Designer).is_empty());
        }
    }

    #[test]
    fn system_transitions_cover_quotation_flow() {
        assert!(Submitted.can_transition(DesignInProgress, Actor::System));
        assert!(DesignInProgress.can_transition(Quoted, Actor::System));
        assert!(Quoted.can_transition(Accepted, Actor::System));
        assert!(Quoted.can_transition(Submitted, Actor::System));
        assert!(!Accepted.can_transition(Quoted, Actor::System));
    }

    #[test]
    fn designer_can_be_picked_before_submission() {
        assert!(Draft.accepts_designer());
        assert!(Submitted.accepts_designer());
        assert!(!DesignInProgress.accepts_designer());
        assert!(!Quoted.accepts_designer());

        // Drafts wait for submit, which then chains into design work
        assert_eq!(Draft.on_designer_assigned(), None);
        assert!(Draft.can_transition(Submitted, Actor::User(Role::Customer)));
        assert!(Submitted.can_transition(DesignInProgress, Actor::System));

        let next = Submitted.on_designer_assigned();
        assert_eq!(next, Some(DesignInProgress));
        assert!(next.is_some_and(|to| Submitted.can_transition(to, Actor::System)));
    }

    #[test]
    fn drafted_designer_can_follow_the_project() {
        let mut p = project(Draft);
        let designer = Uuid::new_v4();
        p.designer_id = Some(designer);
        assert!(p.can_view(designer, Role::Designer));
        assert_eq!(p.stakeholders_except(p.customer_id), vec![designer]);
    }

    #[test]
    fn terminal_states_have_no_exit() {
        for to in ProjectStatus::ALL {
            for actor in [
                Actor::System,
                Actor::User(Role::Customer),
                Actor::User(Role::Seller),
            ] {
                assert!(!Completed.can_transition(*to, actor));
                assert!(!Cancelled.can_transition(*to, actor));
            }
        }
    }

    #[test]
    fn visibility_rules() {
        let mut p = project(Draft);
        let stranger_seller = Uuid::new_v4();
        assert!(p.can_view(p.customer_id, Role::Customer));
        assert!(!p.can_view(Uuid::new_v4(), Role::Customer));
        assert!(!p.can_view(stranger_seller, Role::Seller));

        p.status = Submitted;
        assert!(p.can_view(stranger_seller, Role::Seller));

        p.status = InProgress;
        assert!(!p.can_view(stranger_seller, Role::Seller));
        p.seller_id = Some(stranger_seller);
        assert!(p.can_view(stranger_seller, Role::Seller));

        let designer = Uuid::new_v4();
        assert!(!p.can_view(designer, Role::Designer));
        p.designer_id = Some(designer);
        assert!(p.can_view(designer, Role::Designer));
    }

    #[test]
    fn stakeholders_skip_the_actor() {
        let mut p = project(Quoted);
        let designer = Uuid::new_v4();
        p.designer_id = Some(designer);
        assert_eq!(p.stakeholders_except(p.customer_id), vec![designer]);
        assert_eq!(p.stakeholders_except(designer), vec![p.customer_id]);
    }

    #[test]
    fn transitions_depend_on_relationship() {
        let mut p = project(Accepted);
        let seller = Uuid::new_v4();
        assert!(p.transitions_for(seller, Role::Seller).is_empty());
        p.seller_id = Some(seller);
        assert_eq!(p.transitions_for(seller, Role::Seller), vec![InProgress]);
        assert!(p.transitions_for(Uuid::new_v4(), Role::Customer).is_empty());

        let draft = project(Draft);
        assert_eq!(
            draft.transitions_for(draft.customer_id, Role::Customer),
            vec![Submitted, Cancelled]
        );
    }

    #[test]
    fn create_request_is_trimmed_and_checked() {
        let req = CreateProjectRequest {
            title: "  Kitchen remodel ".into(),
            description: Some("   ".into()),
            property_type: None,
            address: None,
            city: Some("Pune".into()),
            state_code: Some("27".into()),
            budget: Some(Decimal::new(250_000, 0)),
        }
        .validate()
        .unwrap();
        assert_eq!(req.title, "Kitchen remodel");
        assert_eq!(req.description, None);

        let bad = CreateProjectRequest {
            title: "Flat".into(),
            description: None,
            property_type: None,
            address: None,
            city: None,
            state_code: Some("55".into()),
            budget: None,
        };
        assert_eq!(bad.validate().unwrap_err().0, "state_code");
    }

    #[test]
    fn update_rejects_blank_title_and_negative_budget() {
        let blank = UpdateProjectRequest {
            title: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(blank.validate().unwrap_err().0, "title");

        let negative = UpdateProjectRequest {
            budget: Some(Decimal::new(-1, 0)),
            ..Default::default()
        };
        assert_eq!(negative.validate().unwrap_err().0, "budget");
    }

    #[test]
    fn status_text_parsing() {
        assert_eq!("in_progress".parse::<ProjectStatus>().unwrap(), InProgress);
        assert!("archived".parse::<ProjectStatus>().is_err());
    }
}
