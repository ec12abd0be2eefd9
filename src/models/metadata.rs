use std::fmt;

/// A metadata value kept consistent between the settings record and the About document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MirroredField {
    Name,
    Author,
    Version,
}

impl MirroredField {
    pub const ALL: [MirroredField; 3] = [Self::Name, Self::Author, Self::Version];

    /// Element name of the field inside the About document
    pub fn element_name(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Author => "Author",
            Self::Version => "Version",
        }
    }
}

impl fmt::Display for MirroredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Values of the three mirrored fields as seen on one side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirroredFields {
    pub name: String,
    pub author: String,
    pub version: String,
}

impl MirroredFields {
    pub fn new(
        name: impl Into<String>,
        author: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            author: author.into(),
            version: version.into(),
        }
    }

    pub fn get(&self, field: MirroredField) -> &str {
        match field {
            MirroredField::Name => &self.name,
            MirroredField::Author => &self.author,
            MirroredField::Version => &self.version,
        }
    }

    pub fn set(&mut self, field: MirroredField, value: impl Into<String>) {
        let value = value.into();
        match field {
            MirroredField::Name => self.name = value,
            MirroredField::Author => self.author = value,
            MirroredField::Version => self.version = value,
        }
    }

    /// Fields whose value differs from `other`, in declaration order
    pub fn differing(&self, other: &MirroredFields) -> Vec<MirroredField> {
        MirroredField::ALL
            .into_iter()
            .filter(|field| self.get(*field) != other.get(*field))
            .collect()
    }
}
