use std::fmt;
use std::str::FromStr;

pub const MAX_OBJECT_ID_LEN: usize = 32;

/// A validated object id: 1 to 32 ASCII alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn parse(id: &str) -> Result<Self, ObjectIdError> {
        if id.is_empty() {
            return Err(ObjectIdError::Empty);
        }
        if id.len() > MAX_OBJECT_ID_LEN {
            return Err(ObjectIdError::TooLong(id.len()));
        }
        if let Some(c) = id.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(ObjectIdError::InvalidCharacter(c));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectIdError {
    #[error("object id is empty")]
    Empty,
    #[error("object id is {0} characters, at most 32 allowed")]
    TooLong(usize),
    #[error("object id contains invalid character {0:?}")]
    InvalidCharacter(char),
}
