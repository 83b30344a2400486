use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ServiceError;

/// `projects/{project}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectName {
    project: String,
}

impl ProjectName {
    pub fn of(project: impl Into<String>) -> Self {
        Self { project: project.into() }
    }

    pub fn project(&self) -> &str {
        &self.project
    }
}

impl std::fmt::Display for ProjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "projects/{}", self.project)
    }
}

impl FromStr for ProjectName {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            ["projects", project] if !project.is_empty() => Ok(Self::of(*project)),
            _ => Err(ServiceError::invalid_argument(format!("malformed project name '{s}'"))),
        }
    }
}

/// Defines a `projects/{project}/{collection}/{id}` resource name.
macro_rules! resource_name {
    ($(#[$meta:meta])* $name:ident, $collection:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            project: String,
            id: String,
        }

        impl $name {
            pub fn of(project: impl Into<String>, id: impl Into<String>) -> Self {
                Self { project: project.into(), id: id.into() }
            }

            pub fn project(&self) -> &str {
                &self.project
            }

            pub fn id(&self) -> &str {
                &self.id
            }

            pub fn project_name(&self) -> ProjectName {
                ProjectName::of(self.project.clone())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "projects/{}/{}/{}", self.project, $collection, self.id)
            }
        }

        impl FromStr for $name {
            type Err = ServiceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.split('/').collect::<Vec<_>>().as_slice() {
                    ["projects", project, $collection, id]
                        if !project.is_empty() && !id.is_empty() =>
                    {
                        Ok(Self::of(*project, *id))
                    }
                    _ => Err(ServiceError::invalid_argument(format!(
                        concat!("malformed ", $collection, " name '{}'"),
                        s
                    ))),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

resource_name!(
    /// `projects/{project}/schemas/{schema}`
    SchemaName,
    "schemas"
);

resource_name!(
    /// `projects/{project}/topics/{topic}`
    TopicName,
    "topics"
);

resource_name!(
    /// `projects/{project}/subscriptions/{subscription}`
    SubscriptionName,
    "subscriptions"
);
