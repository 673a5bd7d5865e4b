//! User and group records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::{validate_identifier, NodeKind, NodeRef};
use crate::error::MembershipError;

/// Where a user's profile picture lives.
///
/// Web URLs are kept apart from object-storage keys so callers know
/// whether the reference can be fetched directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "uri", rename_all = "snake_case")]
pub enum ProfilePicture {
    /// Directly fetchable http(s) URL.
    Url(String),
    /// Object storage reference (bucket key or `s3://` URI).
    S3(String),
}

impl ProfilePicture {
    /// Classify a raw reference. Empty input means no picture.
    pub fn parse(uri: &str) -> Option<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            None
        } else if uri.starts_with("http") {
            Some(Self::Url(uri.to_string()))
        } else {
            Some(Self::S3(uri.to_string()))
        }
    }

    /// The raw reference.
    pub fn uri(&self) -> &str {
        match self {
            Self::Url(u) | Self::S3(u) => u,
        }
    }

    /// Storage tag used by persistent backends.
    pub fn storage_kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::S3(_) => "s3",
        }
    }

    /// Rebuild from a storage tag and reference.
    pub fn from_storage(kind: &str, uri: String) -> Option<Self> {
        match kind {
            "url" => Some(Self::Url(uri)),
            "s3" => Some(Self::S3(uri)),
            _ => None,
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Unique username.
    pub username: String,
    /// One or more email addresses.
    pub email: Vec<String>,
    /// Optional profile picture reference (URL or object key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_uri: Option<String>,
}

impl NewUser {
    /// Create a user input with a single address.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: vec![email.into()],
            profile_picture_uri: None,
        }
    }

    /// Add another email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email.push(email.into());
        self
    }

    /// Set the profile picture reference.
    pub fn with_profile_picture(mut self, uri: impl Into<String>) -> Self {
        self.profile_picture_uri = Some(uri.into());
        self
    }

    /// Validate and normalize into a `User` stamped with `created_at`.
    ///
    /// Duplicate addresses collapse, keeping first-occurrence order.
    pub fn into_user(self, created_at: DateTime<Utc>) -> Result<User, MembershipError> {
        validate_identifier(NodeKind::User, &self.username)?;

        if self.email.is_empty() {
            return Err(MembershipError::Validation(
                "At least one email is required".to_string(),
            ));
        }

        let mut email: Vec<String> = Vec::with_capacity(self.email.len());
        for address in self.email {
            let address = address.trim().to_string();
            validate_email(&address)?;
            if !email.contains(&address) {
                email.push(address);
            }
        }

        Ok(User {
            username: self.username,
            email,
            profile_picture: self
                .profile_picture_uri
                .as_deref()
                .and_then(ProfilePicture::parse),
            created_at,
        })
    }
}

fn validate_email(address: &str) -> Result<(), MembershipError> {
    let mut parts = address.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && !domain.is_empty(),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MembershipError::Validation(format!(
            "Invalid email address: '{}'",
            address
        )))
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique, immutable identifier.
    pub username: String,
    /// Email addresses (at least one).
    pub email: Vec<String>,
    /// Optional profile picture.
    pub profile_picture: Option<ProfilePicture>,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Tagged reference to this user.
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::user(self.username.clone())
    }

    /// Raw profile picture reference, if any.
    pub fn profile_picture_uri(&self) -> Option<&str> {
        self.profile_picture.as_ref().map(ProfilePicture::uri)
    }

    /// Profile picture when it is a web URL.
    pub fn profile_picture_url(&self) -> Option<&str> {
        match &self.profile_picture {
            Some(ProfilePicture::Url(u)) => Some(u),
            _ => None,
        }
    }

    /// Profile picture when it is an object storage reference.
    pub fn profile_picture_s3_uri(&self) -> Option<&str> {
        match &self.profile_picture {
            Some(ProfilePicture::S3(u)) => Some(u),
            _ => None,
        }
    }
}

/// A group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique, immutable identifier.
    pub group_name: String,
    /// Insertion timestamp.
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Validate a name and build a group stamped with `created_at`.
    pub fn new(group_name: impl Into<String>, created_at: DateTime<Utc>) -> Result<Self, MembershipError> {
        let group_name = group_name.into();
        validate_identifier(NodeKind::Group, &group_name)?;
        Ok(Self { group_name, created_at })
    }

    /// Tagged reference to this group.
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::group(self.group_name.clone())
    }
}
