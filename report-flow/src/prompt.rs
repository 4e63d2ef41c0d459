//! Prompt construction for report generation and the clinical chat.
//!
//! The report prompt is plain text fed to the model, so field values are
//! inlined verbatim. Formatting instructions ask for HTML fragments because the
//! result is injected straight into the browser and printed from there.

use crate::intake::IntakePayload;

/// Persona and output constraints for report generation.
pub const REPORT_SYSTEM_PROMPT: &str = "Eres un cardiólogo especialista en Argentina con amplia experiencia en solicitudes de dispositivos cardiovasculares para obras sociales. Redacta informes médicos profesionales siguiendo las guías internacionales ESC, AHA y SAC. Responde únicamente con fragmentos HTML semánticos (h3, p, strong, em, ul, ol, li); nunca uses Markdown.";

/// Persona for the clinical chat assistant.
pub const CHAT_SYSTEM_PROMPT: &str = "Eres un asistente de IA diseñado para apoyar a cardiólogos licenciados en su práctica clínica.

Tus respuestas deben ser:
- Basadas en evidencia y alineadas con las guías cardiovasculares actuales (AHA, ESC, ACC, SEC).
- Profesionales y concisas, apropiadas para una consulta entre colegas.
- Conscientes de interacciones farmacológicas, contraindicaciones y dosificación de medicamentos cardíacos.
- Acompañadas de diagnósticos diferenciales y referencias a guías cuando corresponda.

Eres una herramienta de apoyo a la decisión clínica, no un reemplazo del juicio médico. No estás pensado para emergencias: ante una urgencia indica seguir los protocolos institucionales.

Responde SIEMPRE en español; incluye el término en inglés entre paréntesis cuando aporte claridad.";

const REPORT_SECTIONS: &str = "Por favor, genera un informe médico completo que incluya:

1. HISTORIA CLÍNICA RESUMIDA: Resumen profesional del caso clínico

2. JUSTIFICACIÓN MÉDICA: Justificación detallada para la solicitud del dispositivo, incluyendo citas específicas de guías clínicas relevantes (ESC, AHA, SAC) con sus DOI correspondientes

3. CLASIFICACIÓN DE INDICACIÓN: Determina si es Clase I, IIa o IIb según las guías internacionales

4. CONCLUSIÓN: Recomendación clara para la obra social

El informe debe estar redactado en terminología médica profesional argentina, siguiendo el formato estándar para presentaciones a obras sociales.";

const HTML_FORMAT_RULES: &str = "FORMATO DE SALIDA (obligatorio):
- Usa exclusivamente fragmentos HTML: <h3> para los títulos de sección, <p> para párrafos, <strong> y <em> para énfasis, <ul>/<ol> con <li> para listas.
- No incluyas <html>, <head>, <body> ni estilos en línea.
- No uses Markdown: nada de #, **, __, guiones como viñetas ni bloques de código.
- No envuelvas la respuesta en comillas ni en bloques ```.";

/// Render the intake payload into the report-generation prompt.
///
/// Sections always appear in the same order and every field is rendered, even
/// when empty.
pub fn build_report_prompt(payload: &IntakePayload) -> String {
    let symptoms: String = payload
        .sintomas
        .present()
        .iter()
        .map(|symptom| format!("- {}\n", symptom))
        .collect();

    format!(
        "Como especialista en cardiología, genera un informe médico profesional para solicitud de dispositivo cardiovascular basado en los siguientes datos del paciente:

DATOS DEL PACIENTE:
- Nombre: {nombre} {apellido}
- Edad: {edad} años
- Historia Clínica: {historia}
- Resumen clínico: {resumen}

SÍNTOMAS ACTUALES:
{symptoms}
ESTUDIOS COMPLEMENTARIOS:
Ecocardiograma:
- FEVI: {fevi}
- Diámetros: {diametros}
- Valvulopatías: {valvulopatias}

Holter:
- Pausas: {pausas}
- Bloqueos AV: {bloqueos_av}
- Episodios de FA: {episodios_fa}

ECG:
- Ritmo: {ritmo}
- Bloqueos: {bloqueos}
- QRS: {qrs}
- Alteraciones: {alteraciones}

SOLICITUD: {solicitud} ({etiqueta})

{REPORT_SECTIONS}

{HTML_FORMAT_RULES}
",
        nombre = payload.nombre,
        apellido = payload.apellido,
        edad = payload.edad,
        historia = payload.historia_clinica,
        resumen = payload.resumen_clinico,
        fevi = payload.ecocardiograma.fevi,
        diametros = payload.ecocardiograma.diametros,
        valvulopatias = payload.ecocardiograma.valvulopatias,
        pausas = payload.holter.pausas,
        bloqueos_av = payload.holter.bloqueos_av,
        episodios_fa = payload.holter.episodios_fa,
        ritmo = payload.ecg.ritmo,
        bloqueos = payload.ecg.bloqueos,
        qrs = payload.ecg.qrs,
        alteraciones = payload.ecg.alteraciones,
        solicitud = payload.tipo_solicitud.as_str(),
        etiqueta = payload.tipo_solicitud.label(),
    )
}
