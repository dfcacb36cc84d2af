//! Contact wire types for the provider's v4 contacts API.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Custom field codes this crate interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum FieldCode {
    Phone,
    Email,
    /// Any other provider-defined code; kept so parsing never fails on it.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    #[serde(default)]
    pub field_code: Option<FieldCode>,
    #[serde(default)]
    pub values: Vec<FieldValue>,
}

impl CustomField {
    pub fn single(code: FieldCode, value: impl Into<String>) -> Self {
        Self {
            field_code: Some(code),
            values: vec![FieldValue {
                value: serde_json::Value::String(value.into()),
            }],
        }
    }
}

/// A contact as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub custom_fields_values: Option<Vec<CustomField>>,
}

impl Contact {
    /// First value of the first field carrying `code`, as a string.
    pub fn field_value(&self, code: FieldCode) -> Option<String> {
        let field = self
            .custom_fields_values
            .as_deref()?
            .iter()
            .find(|f| f.field_code == Some(code))?;
        match &field.values.first()?.value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn phone(&self) -> Option<String> {
        self.field_value(FieldCode::Phone)
    }

    pub fn email(&self) -> Option<String> {
        self.field_value(FieldCode::Email)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EmbeddedContacts {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

/// Body of `GET api/v4/contacts`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ContactsResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedContacts>,
}

impl ContactsResponse {
    pub fn into_first(self) -> Option<Contact> {
        self.embedded?.contacts.into_iter().next()
    }
}

/// One element of the create/update request arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub custom_fields_values: Vec<CustomField>,
}

impl ContactPayload {
    pub fn new(name: &str, email: &str, phone: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            custom_fields_values: vec![
                CustomField::single(FieldCode::Phone, phone),
                CustomField::single(FieldCode::Email, email),
            ],
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}
