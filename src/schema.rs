// ABOUTME: Read-only taxonomy for the technical archive and the stage-ordered dossier
// ABOUTME: Built once at startup and passed explicitly to the resolver, ledger seeding and progress

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::ProjectType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subcategory {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Subcategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub key: String,
    pub label: String,
    pub categories: Vec<Category>,
}

/// Section → category → optional subcategory taxonomy of the technical archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySchema {
    pub sections: Vec<Section>,
}

impl CategorySchema {
    /// Matches a stored or requested segment against section keys first, then labels.
    pub fn find_section(&self, segment: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.key == segment)
            .or_else(|| self.sections.iter().find(|s| s.label == segment))
    }
}

impl Section {
    pub fn find_category(&self, segment: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.key == segment)
            .or_else(|| self.categories.iter().find(|c| c.label == segment))
    }
}

impl Category {
    pub fn find_subcategory(&self, segment: &str) -> Option<&Subcategory> {
        self.children
            .iter()
            .find(|s| s.key == segment || s.label == segment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTemplate {
    pub key: String,
    pub title: String,
    pub required: bool,
    pub multi: bool,
    pub allowed_ext: Vec<String>,
    pub order: i32,
    pub optional_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTemplate {
    pub code: String,
    pub name: String,
    pub order: i32,
    pub deliverables: Vec<SlotTemplate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DossierTemplate {
    pub stages: Vec<StageTemplate>,
}

/// Both taxonomies for every project type.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    archive: HashMap<ProjectType, CategorySchema>,
    dossier: HashMap<ProjectType, DossierTemplate>,
}

impl SchemaCatalog {
    pub fn new(
        archive: HashMap<ProjectType, CategorySchema>,
        dossier: HashMap<ProjectType, DossierTemplate>,
    ) -> Self {
        Self { archive, dossier }
    }

    pub fn builtin() -> Self {
        let mut archive = HashMap::new();
        archive.insert(ProjectType::External, external_archive());
        archive.insert(ProjectType::Internal, internal_archive());

        let mut dossier = HashMap::new();
        dossier.insert(ProjectType::External, external_dossier());
        dossier.insert(ProjectType::Internal, internal_dossier());

        Self::new(archive, dossier)
    }

    pub fn category_schema(&self, project_type: ProjectType) -> Option<&CategorySchema> {
        self.archive.get(&project_type)
    }

    pub fn dossier(&self, project_type: ProjectType) -> Option<&DossierTemplate> {
        self.dossier.get(&project_type)
    }
}

fn category(key: &str, label: &str) -> Category {
    Category {
        key: key.to_string(),
        label: label.to_string(),
        children: Vec::new(),
    }
}

fn info_section(categories: Vec<Category>) -> CategorySchema {
    CategorySchema {
        sections: vec![Section {
            key: "info".to_string(),
            label: "Información técnica".to_string(),
            categories,
        }],
    }
}

fn external_archive() -> CategorySchema {
    info_section(vec![
        category("ensayos", "Ensayos de laboratorio"),
        category("datos_crudos", "Datos crudos"),
        category("codigos", "Códigos de programación"),
        category("info_cliente", "Información técnica del cliente"),
        category("referencias", "Referencias Bibliográficas"),
        category("resultados", "Resultados procesados"),
        category("figuras", "Visualizaciones-Figuras"),
        category("doc_tecnica", "Documentación técnica interna"),
        category("presentacion", "Material de presentación"),
        category("entregables_cliente", "Entregables al cliente"),
    ])
}

fn internal_archive() -> CategorySchema {
    info_section(vec![
        category("ensayos", "Ensayos de laboratorio"),
        category("datos_crudos", "Datos crudos"),
        category("algoritmos", "Algoritmos-Código de programación"),
        category("info_tecnica", "Información técnica"),
        category("referencias", "Referencias Bibliográficas"),
        category("resultados", "Resultados procesados"),
        category("figuras", "Visualizaciones-Figuras"),
        category("doc_tecnica", "Documentación técnica interna"),
        category("presentacion", "Material de presentación"),
        category("entregables", "Entregables"),
    ])
}

const CONTRACT_EXTRAS: &str = "documentos_contrato_adicionales";

fn slot(key: &str, title: &str, required: bool, multi: bool, exts: &[&str], order: i32) -> SlotTemplate {
    SlotTemplate {
        key: key.to_string(),
        title: title.to_string(),
        required,
        multi,
        allowed_ext: exts.iter().map(|e| e.to_string()).collect(),
        order,
        optional_group: None,
    }
}

fn contract_extra(key: &str, title: &str, order: i32) -> SlotTemplate {
    SlotTemplate {
        optional_group: Some(CONTRACT_EXTRAS.to_string()),
        ..slot(key, title, false, false, &["pdf"], order)
    }
}

fn stage(code: &str, name: &str, order: i32, deliverables: Vec<SlotTemplate>) -> StageTemplate {
    StageTemplate {
        code: code.to_string(),
        name: name.to_string(),
        order,
        deliverables,
    }
}

const PDF: &[&str] = &["pdf"];
const WORD: &[&str] = &["doc", "docx"];
const SHEET: &[&str] = &["xls", "xlsx"];
const PDF_OR_WORD: &[&str] = &["pdf", "doc", "docx"];

fn external_dossier() -> DossierTemplate {
    DossierTemplate {
        stages: vec![
            stage("E1", "1 Concertación del proyecto", 1, vec![
                slot("solicitud_servicio_dirigida_dg", "Solicitud de servicio dirigida al Director General", true, false, PDF, 1),
                slot("comunicacion_con_cliente", "Comunicación con el cliente (email y/o minutas)", true, true, PDF, 2),
            ]),
            stage("E2", "2 Gestión de la propuesta técnico-económica", 2, vec![
                slot("propuesta_tecnico_economica_editable", "Propuesta técnico-económica editable", true, false, WORD, 1),
                slot("propuesta_tecnico_economica_firmada", "Propuesta técnico-económica firmada", true, false, PDF, 2),
                slot("f3_ri_001_propuesta_economica", "F3-RI-001 Propuesta económica", true, false, PDF_OR_WORD, 3),
                slot("f4_ri_001_gestion_riesgos", "F4-RI-001 Gestión de riesgos", true, false, PDF_OR_WORD, 4),
                slot("comunicacion_aceptacion_propuesta", "Comunicación con el cliente - Aceptación de propuesta", true, true, PDF, 5),
            ]),
            stage("E3", "3 Gestión inicial del proyecto", 3, vec![
                slot("contrato_convenio_transparencia_con_anexos", "Contrato, convenio u oficio de transparencia de recursos con anexos", true, true, PDF, 1),
                slot("f1_ri_002_programa_actividades", "F1 RI-002 Programa de actividades (Cronograma cero)", true, false, SHEET, 2),
                slot("comunicacion_elaboracion_contrato", "Comunicación con el cliente – Gestión para elaboración del contrato", true, true, PDF, 3),
                contract_extra("acta_constitutiva_empresa", "Acta constitutiva de la empresa", 101),
                contract_extra("poder_notarial_representante", "Poder notarial de la persona que firmará el contrato", 102),
                contract_extra("ine_representante_legal", "INE del representante legal", 103),
                contract_extra("comprobante_domicilio_empresa", "Comprobante de domicilio de la empresa", 104),
                contract_extra("constancia_situacion_fiscal", "Constancia de situación fiscal (empresa)", 105),
                contract_extra("opinion_cumplimiento_sat", "Opinión de Cumplimiento SAT", 106),
                contract_extra("opinion_cumplimiento_infonavit", "Opinión de Cumplimiento INFONAVIT", 107),
                contract_extra("opinion_cumplimiento_imss", "Opinión de Cumplimiento IMSS", 108),
                contract_extra("permisos_o_asignacion_obra", "Permisos o asignación de la obra por autoridades", 109),
            ]),
            stage("E4", "4 Desarrollo del proyecto de investigación", 4, vec![
                slot("informes_bimestrales_sistema_proyectos", "Informes bimestrales del sistema de proyectos", true, true, SHEET, 1),
                slot("informes_parciales_editables", "Informes parciales editables", true, true, WORD, 2),
                slot("informes_parciales_firmados_y_oficio", "Informes parciales firmados y oficio de entrega", true, true, PDF, 3),
                slot("informe_final_editable", "Informe final editable", true, false, WORD, 4),
                slot("informe_final_firmado_y_oficio", "Informe final firmado y oficio de entrega", true, false, PDF, 5),
                slot("comunicacion_seguimiento_reprogramaciones", "Comunicación con el cliente – Seguimiento, reprogramaciones y cancelaciones", true, true, PDF, 6),
            ]),
            stage("E5", "5 Gestión final del proyecto", 5, vec![
                slot("oficio_de_envio", "Oficio de envío", true, false, PDF, 1),
                slot("encuesta_f1_rs_019", "Encuesta F1 RS-019", true, false, PDF, 2),
                slot("lista_verificacion_f1_ri_007", "Lista de verificación F1 RI-007", true, false, PDF, 3),
            ]),
        ],
    }
}

fn internal_dossier() -> DossierTemplate {
    DossierTemplate {
        stages: vec![
            stage("I1", "1 Desarrollo de propuestas para realizar investigación", 1, vec![
                slot("correo_difusion_convocatoria", "Correo electrónico con la difusión de la convocatoria", true, false, PDF, 1),
                slot("protocolo_investigacion_aprobado", "Protocolo de investigación aprobado", true, false, WORD, 2),
                slot("f3_ri_001_propuesta_economica", "F3-RI-001 Propuesta económica", true, false, WORD, 3),
                slot("f4_ri_001_gestion_riesgos", "F4-RI-001 Gestión de riesgos", true, false, WORD, 4),
            ]),
            stage("I2", "2 Gestión de la autorización", 2, vec![
                slot("dictamen_seleccion_pii", "Dictamen de selección del PII", true, false, PDF, 1),
                slot("notificacion_dictamen_pii", "Notificación del dictamen de selección del PII", true, false, PDF, 2),
                slot("protocolo_investigacion_autorizado_firmado", "Protocolo de investigación autorizado firmado", true, false, PDF, 3),
            ]),
            stage("I3", "3 Desarrollo del proyecto de investigación", 3, vec![
                slot("f1_ri_002_programa_actividades", "F1 RI-002 Programa de actividades", true, false, SHEET, 1),
                slot("informes_bimestrales_sistema_proyectos", "Informes bimestrales del sistema de proyectos", true, true, SHEET, 2),
                slot("oficio_reprogramacion", "Oficio de reprogramación", false, false, PDF, 3),
                slot("publicacion_tecnica_word", "Publicación técnica (Word)", true, false, WORD, 4),
                slot("publicacion_tecnica_pdf", "Publicación técnica (PDF)", true, false, PDF, 5),
            ]),
            stage("I4", "4 Gestión final del proyecto", 4, vec![
                slot("resultado_evaluacion_f1_gs_006_firmada", "Resultado de la evaluación F1 GS-006 Firmada", true, false, PDF, 1),
                slot("constancia_envio_coordinador", "Constancia de envío por el coordinador", true, false, PDF, 2),
                slot("lista_verificacion_formato_publicacion", "Lista de verificación de formato para la publicación", true, false, PDF, 3),
                slot("lista_verificacion_f2_ri_007", "Lista de verificación F2 RI-007", true, false, PDF, 4),
            ]),
        ],
    }
}
