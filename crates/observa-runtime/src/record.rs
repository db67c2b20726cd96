//! Structured observation records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Resolution status of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Estado {
    Absuelta,
    #[default]
    #[serde(rename = "No Absuelta")]
    NoAbsuelta,
    Invalidada,
}

impl Estado {
    /// Lenient parse; anything unrecognized is `No Absuelta`.
    pub fn parse(s: &str) -> Self {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "absuelta" => Estado::Absuelta,
            "invalidada" => Estado::Invalidada,
            _ => Estado::NoAbsuelta,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Estado::Absuelta => "Absuelta",
            Estado::NoAbsuelta => "No Absuelta",
            Estado::Invalidada => "Invalidada",
        }
    }
}

impl std::fmt::Display for Estado {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Estado {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Estado::parse(&s),
            _ => Estado::default(),
        })
    }
}

/// One structured observation entry as returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Numero_de_observacion", deserialize_with = "required_text")]
    pub numero_de_observacion: String,
    #[serde(rename = "Descripcion", deserialize_with = "required_text")]
    pub descripcion: String,
    #[serde(
        rename = "Informacion_Complementaria",
        default,
        deserialize_with = "optional_text"
    )]
    pub informacion_complementaria: Option<String>,
    /// Letter of the sub-item, when the observation has lettered items.
    #[serde(
        rename = "Literal",
        default,
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub literal: Option<String>,
    #[serde(rename = "Respuesta", default, deserialize_with = "optional_text")]
    pub respuesta: Option<String>,
    #[serde(rename = "Estado", default)]
    pub estado: Estado,
    /// Any further keys the model emitted, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub const ERROR_NUMBER: &str = "Error";
pub const ERROR_DESCRIPTION: &str = "Error al procesar";

impl Record {
    /// The synthetic record standing in for a section that could not be processed.
    pub fn error() -> Self {
        Self {
            numero_de_observacion: ERROR_NUMBER.into(),
            descripcion: ERROR_DESCRIPTION.into(),
            informacion_complementaria: None,
            literal: None,
            respuesta: None,
            estado: Estado::NoAbsuelta,
            extra: Map::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.numero_de_observacion == ERROR_NUMBER && self.descripcion == ERROR_DESCRIPTION
    }

    /// Convert a parsed JSON value, rejecting non-objects and missing required fields.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn required_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected text, found {}",
            other
        ))),
    }
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Value::deserialize(deserializer).map(scalar_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_record() {
        let record = Record::from_value(json!({
            "Numero_de_observacion": "2.3",
            "Descripcion": "No se adjuntó el plano",
            "Informacion_Complementaria": null,
            "Literal": "a",
            "Respuesta": "Se adjunta en anexo",
            "Estado": "Absuelta"
        }))
        .unwrap();
        assert_eq!(record.numero_de_observacion, "2.3");
        assert_eq!(record.literal.as_deref(), Some("a"));
        assert_eq!(record.estado, Estado::Absuelta);
        assert!(record.extra.is_empty());
        assert!(!record.is_error());
    }

    #[test]
    fn test_estado_defaults() {
        let missing = Record::from_value(json!({"Numero_de_observacion": "1", "Descripcion": "d"}))
            .unwrap();
        assert_eq!(missing.estado, Estado::NoAbsuelta);

        let unknown = Record::from_value(json!({
            "Numero_de_observacion": "1", "Descripcion": "d", "Estado": "Pendiente"
        }))
        .unwrap();
        assert_eq!(unknown.estado, Estado::NoAbsuelta);

        assert_eq!(Estado::parse("  INVALIDADA "), Estado::Invalidada);
        assert_eq!(Estado::parse("no  absuelta"), Estado::NoAbsuelta);
    }

    #[test]
    fn test_numeric_observation_number() {
        let record =
            Record::from_value(json!({"Numero_de_observacion": 1.1, "Descripcion": "d"})).unwrap();
        assert_eq!(record.numero_de_observacion, "1.1");
    }

    #[test]
    fn test_rejects_non_conformant() {
        assert!(Record::from_value(json!({"Descripcion": "sin número"})).is_err());
        assert!(Record::from_value(json!({"Numero_de_observacion": "1"})).is_err());
        assert!(Record::from_value(json!(["no", "objeto"])).is_err());
        assert!(Record::from_value(json!("texto")).is_err());
    }

    #[test]
    fn test_extra_fields_round_trip() {
        let record = Record::from_value(json!({
            "Numero_de_observacion": "3.1",
            "Descripcion": "d",
            "Pagina": 12
        }))
        .unwrap();
        assert_eq!(record.extra["Pagina"], 12);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["Pagina"], 12);
        assert!(value.get("Literal").is_none());
        assert_eq!(value["Estado"], "No Absuelta");
    }

    #[test]
    fn test_error_record_shape() {
        let value = serde_json::to_value(Record::error()).unwrap();
        assert_eq!(
            value,
            json!({
                "Numero_de_observacion": "Error",
                "Descripcion": "Error al procesar",
                "Informacion_Complementaria": null,
                "Respuesta": null,
                "Estado": "No Absuelta"
            })
        );
        assert!(Record::error().is_error());
    }
}
