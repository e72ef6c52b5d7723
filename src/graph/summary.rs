//! Model summaries: a human-readable layer table and a serializable
//! description for tooling.

use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::model::{Model, ModelLayer};

#[derive(Debug, Serialize, Tabled)]
pub struct LayerRow {
    #[tabled(rename = "Layer (type)")]
    pub layer: String,
    #[tabled(rename = "Output Shape")]
    pub output_shape: String,
    #[tabled(rename = "Param #")]
    pub params: String,
}

impl From<&ModelLayer> for LayerRow {
    fn from(layer: &ModelLayer) -> Self {
        Self {
            layer: format!("{} ({})", layer.name(), layer.kind()),
            output_shape: layer.output_shape().to_string(),
            params: group_thousands(layer.param_count()),
        }
    }
}

/// Machine-readable description of one layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerDescription {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inbound: Option<String>,
    pub output_shape: String,
    pub params: usize,
}

/// Machine-readable description of a model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescription {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub layers: Vec<LayerDescription>,
    pub total_params: usize,
}

impl Model {
    /// Layer table followed by the parameter totals
    pub fn summary(&self) -> String {
        let rows: Vec<LayerRow> = self.layers().iter().map(LayerRow::from).collect();
        let table = Table::new(rows).with(Style::rounded()).to_string();
        let total = self.count_params();

        format!(
            "Model: \"{}\"\n{}\nTotal params: {} ({})\n",
            self.name(),
            table,
            group_thousands(total),
            format_bytes(self.param_bytes())
        )
    }

    /// Weight memory estimate, using each layer's element width
    pub fn param_bytes(&self) -> usize {
        self.layers().iter().fold(0usize, |acc, l| {
            acc.saturating_add(l.param_count().saturating_mul(l.dtype().size_in_bytes()))
        })
    }

    pub fn describe(&self) -> ModelDescription {
        let layers = self.layers();
        ModelDescription {
            name: self.name().to_string(),
            inputs: self.input_shapes().iter().map(|s| s.to_string()).collect(),
            outputs: self.output_shapes().iter().map(|s| s.to_string()).collect(),
            layers: layers
                .iter()
                .map(|l| LayerDescription {
                    name: l.name().to_string(),
                    kind: l.kind().to_string(),
                    units: l.layer().and_then(|layer| layer.units()),
                    activation: l
                        .layer()
                        .and_then(|layer| layer.activation())
                        .map(|a| a.to_string()),
                    inbound: l.inbound().map(|i| layers[i].name().to_string()),
                    output_shape: l.output_shape().to_string(),
                    params: l.param_count(),
                })
                .collect(),
            total_params: self.count_params(),
        }
    }
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_bytes(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
