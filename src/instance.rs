//! Instance connection names.
use std::{fmt, str::FromStr};

use crate::error::Error;

/// Identifier of a Cloud SQL instance: the `project:region:instance` triple.
///
/// The canonical form (via [`fmt::Display`]) is used as the diagnostic prefix
/// on every error scoped to the instance.
///
/// ```
/// use cloud_sql_connector::InstanceName;
///
/// let name: InstanceName = "my-project:us-central1:my-instance".parse().unwrap();
/// assert_eq!(name.project(), "my-project");
/// assert_eq!(name.region(), "us-central1");
/// assert_eq!(name.instance(), "my-instance");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceName {
    project: String,
    region: String,
    instance: String,
}

impl InstanceName {
    /// Build a connection name from its parts. Each part must be non-empty
    /// and free of `':'`.
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        instance: impl Into<String>,
    ) -> Result<Self, Error> {
        let (project, region, instance) = (project.into(), region.into(), instance.into());
        let malformed = [&project, &region, &instance]
            .iter()
            .any(|part| part.is_empty() || part.contains(':'));
        if malformed {
            return Err(Error::MalformedInstanceName(format!(
                "{project}:{region}:{instance}"
            )));
        }
        Ok(Self {
            project,
            region,
            instance,
        })
    }

    /// The project id.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The region id.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The instance id.
    pub fn instance(&self) -> &str {
        &self.instance
    }
}

impl FromStr for InstanceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(':').collect::<Vec<_>>().as_slice() {
            [project, region, instance] => Self::new(*project, *region, *instance)
                .map_err(|_| Error::MalformedInstanceName(s.to_owned())),
            _ => Err(Error::MalformedInstanceName(s.to_owned())),
        }
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.region, self.instance)
    }
}
