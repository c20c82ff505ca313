use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetType {
    Dog,
    Cat,
    Bird,
    Rabbit,
    Fish,
    Hamster,
    Reptile,
    Other,
}

impl PetType {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "dog" => Some(Self::Dog),
            "cat" => Some(Self::Cat),
            "bird" => Some(Self::Bird),
            "rabbit" => Some(Self::Rabbit),
            "fish" => Some(Self::Fish),
            "hamster" => Some(Self::Hamster),
            "reptile" => Some(Self::Reptile),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Dog => "dog",
            Self::Cat => "cat",
            Self::Bird => "bird",
            Self::Rabbit => "rabbit",
            Self::Fish => "fish",
            Self::Hamster => "hamster",
            Self::Reptile => "reptile",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Active,
    Resolved,
    Expired,
}

impl ReportStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "resolved" => Some(Self::Resolved),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Expired => "expired",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Which side of a potential match a report sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Lost,
    Found,
}

impl ReportKind {
    pub fn from_path(value: &str) -> Option<Self> {
        match value {
            "lost" => Some(Self::Lost),
            "found" => Some(Self::Found),
            _ => None,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Lost => "lost_reports",
            Self::Found => "found_reports",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Lost => Self::Found,
            Self::Found => Self::Lost,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LostReport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pet_name: String,
    pub pet_type: PetType,
    pub breed: Option<String>,
    pub color: Option<String>,
    pub age: Option<String>,
    pub description: Option<String>,
    pub last_seen_location: String,
    pub last_seen_date: Date,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub reward: Option<String>,
    pub status: ReportStatus,
    pub images: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundReport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pet_name: Option<String>,
    pub pet_type: PetType,
    pub breed: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub found_location: String,
    pub found_date: Date,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub status: ReportStatus,
    pub images: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Report {
    Lost(LostReport),
    Found(FoundReport),
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Self::Lost(_) => ReportKind::Lost,
            Self::Found(_) => ReportKind::Found,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Lost(report) => report.id,
            Self::Found(report) => report.id,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            Self::Lost(report) => report.user_id,
            Self::Found(report) => report.user_id,
        }
    }

    pub fn pet_type(&self) -> PetType {
        match self {
            Self::Lost(report) => report.pet_type,
            Self::Found(report) => report.pet_type,
        }
    }

    pub fn status(&self) -> ReportStatus {
        match self {
            Self::Lost(report) => report.status,
            Self::Found(report) => report.status,
        }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        match self {
            Self::Lost(report) => report.created_at,
            Self::Found(report) => report.created_at,
        }
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        match self {
            Self::Lost(report) => report.updated_at,
            Self::Found(report) => report.updated_at,
        }
    }
}

/// The slice of a report the match list renders next to the score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pet_name: Option<String>,
    pub pet_type: PetType,
    pub location: String,
    pub date: Date,
    pub image_url: Option<String>,
    pub status: ReportStatus,
}

impl From<&LostReport> for ReportSummary {
    fn from(report: &LostReport) -> Self {
        Self {
            id: report.id,
            user_id: report.user_id,
            pet_name: Some(report.pet_name.clone()),
            pet_type: report.pet_type,
            location: report.last_seen_location.clone(),
            date: report.last_seen_date,
            image_url: report.images.first().cloned(),
            status: report.status,
        }
    }
}

impl From<&FoundReport> for ReportSummary {
    fn from(report: &FoundReport) -> Self {
        Self {
            id: report.id,
            user_id: report.user_id,
            pet_name: report.pet_name.clone(),
            pet_type: report.pet_type,
            location: report.found_location.clone(),
            date: report.found_date,
            image_url: report.images.first().cloned(),
            status: report.status,
        }
    }
}
