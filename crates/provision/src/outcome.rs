use serde::Serialize;

/// Result of a create-or-fetch step. Both arms carry a usable resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "resource", rename_all = "snake_case")]
pub enum Provisioned<T> {
    Created(T),
    Existing(T),
}

impl<T> Provisioned<T> {
    pub fn resource(&self) -> &T {
        match self {
            Self::Created(resource) | Self::Existing(resource) => resource,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(resource) | Self::Existing(resource) => resource,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Existing(_) => "existing",
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Provisioned<U> {
        match self {
            Self::Created(resource) => Provisioned::Created(f(resource)),
            Self::Existing(resource) => Provisioned::Existing(f(resource)),
        }
    }
}
