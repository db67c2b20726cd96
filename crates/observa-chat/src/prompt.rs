//! Prompt template with a single `{text}` placeholder for the section text.

use observa_core::{Error, Result};

/// Placeholder replaced by the section's raw text.
pub const PLACEHOLDER: &str = "{text}";

/// Built-in audit-observation extraction prompt.
///
/// The JSON layout it asks for must stay in line with `Record`: the
/// reconciler does no schema validation beyond field coercion.
pub const DEFAULT_PROMPT: &str = r#"Eres un experto analizando documentos de auditoría.
Te voy a proporcionar un documento que contiene observaciones de un informe técnico y sus respuestas.

Estructura el contenido de las observaciones y respuestas en formato JSON.
Reglas:
- El texto debe ser transcrito; no debe ser interpretado, resumido ni parafraseado.

Algunas observaciones tienen literales (a), b), c)...) y otras no.

Para una observación sin literales usa esta estructura:
[
    {
        "Numero_de_observacion": "número exacto",
        "Descripcion": "descripción principal",
        "Informacion_Complementaria": "información adicional o null",
        "Respuesta": "respuesta encontrada o null",
        "Estado": "Absuelta|No Absuelta|Invalidada"
    }
]

Si la observación tiene literales, devuelve un objeto por literal:
[
    {
        "Numero_de_observacion": "número exacto",
        "Descripcion": "descripción de la observación",
        "Informacion_Complementaria": "información adicional o null",
        "Literal": "letra del literal",
        "Respuesta": "respuesta del literal o null",
        "Estado": "Absuelta|No Absuelta|Invalidada"
    }
]

Texto a analizar: {text}

Instrucciones:
1. Identifica cada observación en el texto.
2. Para cada observación:
   - Extrae el número exacto (ej: "1.1", "2.3").
   - Identifica la descripción principal del problema.
   - Busca información complementaria que sustente la observación.
   - Identifica si hay una respuesta o descargo.
   - Determina el estado según el contexto.

Si solo hay una observación, puedes retornar un único objeto JSON sin lista.
Retorna SOLO el JSON o el arreglo de JSON, sin texto adicional.
"#;

/// A user-editable prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Validate and wrap a template. It must contain the placeholder exactly once.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        match template.matches(PLACEHOLDER).count() {
            1 => Ok(Self { template }),
            0 => Err(Error::Prompt(format!(
                "Template is missing the {} placeholder",
                PLACEHOLDER
            ))),
            n => Err(Error::Prompt(format!(
                "Template has {} {} placeholders, expected one",
                n, PLACEHOLDER
            ))),
        }
    }

    /// Substitute the section text into the template.
    pub fn render(&self, section_text: &str) -> String {
        self.template.replacen(PLACEHOLDER, section_text, 1)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn is_default(&self) -> bool {
        self.template == DEFAULT_PROMPT
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT.to_string(),
        }
    }
}
