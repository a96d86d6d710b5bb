use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::CoreError;

/// Identity of the module (plugin, subsystem) that submitted a piece of work.
///
/// Owners are compared by name. Cloning is cheap, the name is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    name: Arc<str>,
}

impl Owner {
    /// Create an owner. Blank names are rejected, an owner must be attributable.
    pub fn new(name: impl AsRef<str>) -> Result<Self, CoreError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(CoreError::InvalidArgument("Owner name cannot be empty".into()));
        }
        Ok(Self { name: Arc::from(name) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Serialized as the bare name, the form diagnostics report owners in.
impl Serialize for Owner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}
