use serde::{Deserialize, Serialize};
use std::fmt;

/// Clinical intake form submission that drives report generation.
///
/// Every free-text field defaults to an empty string and every flag to `false`,
/// so partially filled forms deserialize cleanly. Only `tipoSolicitud` is
/// mandatory and must be one of the [`RequestType`] literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakePayload {
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub apellido: String,
    #[serde(default)]
    pub edad: String,
    #[serde(default)]
    pub historia_clinica: String,
    #[serde(default)]
    pub resumen_clinico: String,
    #[serde(default)]
    pub sintomas: Symptoms,
    #[serde(default)]
    pub ecocardiograma: Echocardiogram,
    #[serde(default)]
    pub holter: Holter,
    #[serde(default)]
    pub ecg: Ecg,
    pub tipo_solicitud: RequestType,
}

impl IntakePayload {
    /// Patient fields echoed back alongside the generated report.
    pub fn patient_summary(&self) -> PatientSummary {
        PatientSummary {
            nombre: self.nombre.clone(),
            apellido: self.apellido.clone(),
            edad: self.edad.clone(),
            historia_clinica: self.historia_clinica.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Symptoms {
    pub palpitaciones: bool,
    pub mareos: bool,
    pub disnea: bool,
    pub dolor_toracico: bool,
    pub otro: bool,
    pub otro_descripcion: String,
}

impl Symptoms {
    /// Labels of the flagged symptoms, in form order. The free-text "other"
    /// entry is rendered last.
    pub fn present(&self) -> Vec<String> {
        let mut present: Vec<String> = [
            (self.palpitaciones, "Palpitaciones"),
            (self.mareos, "Mareos"),
            (self.disnea, "Disnea"),
            (self.dolor_toracico, "Dolor torácico"),
        ]
        .into_iter()
        .filter(|(flag, _)| *flag)
        .map(|(_, label)| label.to_string())
        .collect();

        if self.otro {
            let description = self.otro_descripcion.trim();
            if description.is_empty() {
                present.push("Otro".to_string());
            } else {
                present.push(format!("Otro: {}", description));
            }
        }

        present
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Echocardiogram {
    pub fevi: String,
    pub diametros: String,
    pub valvulopatias: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Holter {
    pub pausas: String,
    #[serde(rename = "bloqueosAV")]
    pub bloqueos_av: String,
    #[serde(rename = "episodiosFA")]
    pub episodios_fa: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ecg {
    pub ritmo: String,
    pub bloqueos: String,
    pub qrs: String,
    pub alteraciones: String,
}

/// Device or study being requested from the health insurer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    #[serde(rename = "marcapasos-convencional")]
    MarcapasosConvencional,
    #[serde(rename = "marcapasos-cdi")]
    MarcapasosCdi,
    #[serde(rename = "marcapasos-csp")]
    MarcapasosCsp,
    #[serde(rename = "smartecg-biomonitor")]
    SmartEcgBiomonitor,
    #[serde(rename = "holter-24hs")]
    Holter24hs,
}

impl RequestType {
    pub const ALL: [RequestType; 5] = [
        RequestType::MarcapasosConvencional,
        RequestType::MarcapasosCdi,
        RequestType::MarcapasosCsp,
        RequestType::SmartEcgBiomonitor,
        RequestType::Holter24hs,
    ];

    /// Wire literal, as submitted by the intake form.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::MarcapasosConvencional => "marcapasos-convencional",
            RequestType::MarcapasosCdi => "marcapasos-cdi",
            RequestType::MarcapasosCsp => "marcapasos-csp",
            RequestType::SmartEcgBiomonitor => "smartecg-biomonitor",
            RequestType::Holter24hs => "holter-24hs",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestType::MarcapasosConvencional => "Marcapasos convencional",
            RequestType::MarcapasosCdi => "Marcapasos + CDI",
            RequestType::MarcapasosCsp => {
                "Marcapasos de estimulación del sistema de conducción (CSP)"
            }
            RequestType::SmartEcgBiomonitor => "SmartECG con BIOMONITOR IV",
            RequestType::Holter24hs => "Holter 24 hs",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subset of the intake payload returned with the completed report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub nombre: String,
    pub apellido: String,
    pub edad: String,
    pub historia_clinica: String,
}
