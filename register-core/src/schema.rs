use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::item::{Item, Value};

/// Field datatypes understood by registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    String,
    Text,
    Integer,
    Curie,
    Url,
    Datetime,
    Name,
    Hash,
    Period,
    Point,
}

impl Datatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datatype::String => "string",
            Datatype::Text => "text",
            Datatype::Integer => "integer",
            Datatype::Curie => "curie",
            Datatype::Url => "url",
            Datatype::Datetime => "datetime",
            Datatype::Name => "name",
            Datatype::Hash => "hash",
            Datatype::Period => "period",
            Datatype::Point => "point",
        }
    }

    /// Checks a single (non-sequence) value against this datatype.
    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Datatype::Curie, Value::Reference(_)) => true,
            (Datatype::Integer, Value::Scalar(s)) => s.parse::<i64>().is_ok(),
            (Datatype::Curie | Datatype::Integer, _) => false,
            (_, Value::Scalar(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datatype {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "string" => Datatype::String,
            "text" => Datatype::Text,
            "integer" => Datatype::Integer,
            "curie" => Datatype::Curie,
            "url" => Datatype::Url,
            "datetime" => Datatype::Datetime,
            "name" => Datatype::Name,
            "hash" => Datatype::Hash,
            "period" => Datatype::Period,
            "point" => Datatype::Point,
            _ => return Err(SchemaError::UnknownDatatype(s.to_string())),
        })
    }
}

/// Whether a field holds one value or an ordered sequence of values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::One => f.write_str("1"),
            Cardinality::Many => f.write_str("n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub datatype: Datatype,
    pub text: String,
    pub cardinality: Cardinality,
}

impl Field {
    /// Creates a single-valued field.
    pub fn new(name: impl Into<String>, datatype: Datatype, text: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            datatype,
            text: text.into(),
            cardinality: Cardinality::One,
        }
    }

    /// Marks the field as holding a sequence of values.
    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        match (self.cardinality, value) {
            (Cardinality::One, Value::Sequence(_)) => {
                Err(SchemaError::ExpectedScalar(self.name.clone()))
            }
            (Cardinality::Many, Value::Sequence(values)) => {
                values.iter().try_for_each(|v| self.validate_atom(v))
            }
            (Cardinality::Many, _) => Err(SchemaError::ExpectedSequence(self.name.clone())),
            (Cardinality::One, atom) => self.validate_atom(atom),
        }
    }

    fn validate_atom(&self, value: &Value) -> Result<(), SchemaError> {
        if value.is_sequence() {
            return Err(SchemaError::NestedSequence(self.name.clone()));
        }
        if !self.datatype.accepts(value) {
            return Err(SchemaError::Datatype {
                field: self.name.clone(),
                datatype: self.datatype,
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("register name cannot be empty")]
    EmptyName,
    #[error("name {0:?} contains a tab or newline")]
    InvalidName(String),
    #[error("register {0} declares no fields")]
    NoFields(String),
    #[error("duplicate field: {0}")]
    DuplicateField(String),
    #[error("register {0} has no field named after it")]
    MissingPrimaryField(String),
    #[error("unknown datatype: {0}")]
    UnknownDatatype(String),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("field {0} expects a single value")]
    ExpectedScalar(String),
    #[error("field {0} expects a sequence")]
    ExpectedSequence(String),
    #[error("field {0} contains a nested sequence")]
    NestedSequence(String),
    #[error("field {field}: {value:?} is not a valid {datatype}")]
    Datatype {
        field: String,
        datatype: Datatype,
        value: String,
    },
}

/// Register and field names end up in system keys, which must stay on one line.
fn check_name(name: &str) -> Result<(), SchemaError> {
    if name.contains(['\t', '\n', '\r']) {
        return Err(SchemaError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// The immutable description of a register: name, owner and ordered fields.
///
/// The primary key field is the field whose name equals the register name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    organisation: String,
    text: String,
    fields: IndexMap<String, Field>,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        organisation: impl Into<String>,
        text: impl Into<String>,
        fields: impl IntoIterator<Item = Field>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        check_name(&name)?;

        let mut by_name = IndexMap::new();
        for field in fields {
            check_name(&field.name)?;
            if by_name.contains_key(&field.name) {
                return Err(SchemaError::DuplicateField(field.name));
            }
            by_name.insert(field.name.clone(), field);
        }

        if by_name.is_empty() {
            return Err(SchemaError::NoFields(name));
        }
        if !by_name.contains_key(&name) {
            return Err(SchemaError::MissingPrimaryField(name));
        }

        Ok(Schema {
            name,
            organisation: organisation.into(),
            text: text.into(),
            fields: by_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn organisation(&self) -> &str {
        &self.organisation
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn primary_field(&self) -> &Field {
        &self.fields[self.name.as_str()]
    }

    /// Checks that every field of the item is declared and well-typed.
    pub fn validate(&self, item: &Item) -> Result<(), SchemaError> {
        for (name, value) in item.fields() {
            let field = self
                .field(name)
                .ok_or_else(|| SchemaError::UnknownField(name.to_string()))?;
            field.validate(value)?;
        }
        Ok(())
    }

    /// The system-region entries describing this schema, in log order.
    pub(crate) fn system_items(&self) -> Vec<(String, Item)> {
        let mut items = Vec::with_capacity(self.fields.len() + 2);
        items.push(("name".to_string(), Item::new().with("name", self.name.as_str())));

        let field_names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        items.push((
            format!("register:{}", self.name),
            Item::new()
                .with("fields", field_names)
                .with("register", self.name.as_str())
                .with("registry", self.organisation.as_str())
                .with("text", self.text.as_str()),
        ));

        for field in self.fields.values() {
            items.push((
                format!("field:{}", field.name),
                Item::new()
                    .with("cardinality", field.cardinality.to_string())
                    .with("datatype", field.datatype.as_str())
                    .with("field", field.name.as_str())
                    .with("text", field.text.as_str()),
            ));
        }
        items
    }
}
