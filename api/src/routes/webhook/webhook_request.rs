//! Inbound merge-request hook payload and its validation.

use serde::Deserialize;

/// Cap for names, usernames, and branch names.
const NAME_CAP: usize = 255;
/// Cap for merge-request titles.
const TITLE_CAP: usize = 500;
/// Cap for URLs.
const URL_CAP: usize = 1000;
/// Cap for descriptions.
const DESCRIPTION_CAP: usize = 10_000;

/// Actions that start (or restart) a review.
const REVIEWABLE_ACTIONS: &[&str] = &["opened", "open", "update", "reopen"];

/// The forge's merge-request hook body. All groups are optional at the serde
/// level so their absence is a 400, not a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object_kind: Option<String>,
    pub object_attributes: Option<ObjectAttributes>,
    pub project: Option<ProjectInfo>,
    pub user: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectAttributes {
    pub id: i64,
    pub iid: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub work_in_progress: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectInfo {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// The payload with its required groups proven present.
#[derive(Debug)]
pub struct ValidPayload<'a> {
    pub attributes: &'a ObjectAttributes,
    pub project: &'a ProjectInfo,
    pub user: &'a UserInfo,
}

impl WebhookPayload {
    /// Checks required groups and string length caps.
    pub fn validate(&self) -> Result<ValidPayload<'_>, String> {
        let attributes = self
            .object_attributes
            .as_ref()
            .ok_or("missing object_attributes")?;
        let project = self.project.as_ref().ok_or("missing project")?;
        let user = self.user.as_ref().ok_or("missing user")?;

        check_len("object_attributes.title", &attributes.title, TITLE_CAP)?;
        check_len(
            "object_attributes.source_branch",
            &attributes.source_branch,
            NAME_CAP,
        )?;
        check_len(
            "object_attributes.target_branch",
            &attributes.target_branch,
            NAME_CAP,
        )?;
        if let Some(url) = &attributes.url {
            check_len("object_attributes.url", url, URL_CAP)?;
        }
        if let Some(description) = &attributes.description {
            check_len("object_attributes.description", description, DESCRIPTION_CAP)?;
        }
        check_len("project.name", &project.name, NAME_CAP)?;
        check_len("project.namespace", &project.namespace, NAME_CAP)?;
        if let Some(url) = &project.web_url {
            check_len("project.web_url", url, URL_CAP)?;
        }
        check_len("user.username", &user.username, NAME_CAP)?;
        check_len("user.name", &user.name, NAME_CAP)?;

        Ok(ValidPayload {
            attributes,
            project,
            user,
        })
    }
}

impl ObjectAttributes {
    /// True when the pipeline should not run for this delivery: drafts, and
    /// actions outside the reviewable set.
    pub fn should_skip(&self) -> bool {
        if self.work_in_progress {
            return true;
        }
        match self.action.as_deref() {
            Some(action) => !REVIEWABLE_ACTIONS.contains(&action),
            None => true,
        }
    }
}

fn check_len(field: &str, value: &str, cap: usize) -> Result<(), String> {
    if value.len() > cap {
        return Err(format!("{field} exceeds {cap} characters"));
    }
    Ok(())
}
