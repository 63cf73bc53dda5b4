use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("Could not open document: {0}")]
    ExtractionFailed(String),

    #[error("No financial metrics could be extracted ({})", .reasons.join("; "))]
    InsufficientData {
        document_id: Option<String>,
        reasons: Vec<String>,
    },

    #[error("Unsupported document kind: {0}")]
    UnsupportedDocumentKind(String),

    #[error("Record has neither a fiscal year nor a document id, cannot determine natural key for company {0}")]
    MissingNaturalKey(String),

    #[error("Document {document_id} is already linked to another statement (id {existing_id})")]
    DuplicateDocument {
        document_id: String,
        existing_id: u64,
    },

    #[error("Company {company_id} already has statement {existing_id} for FY{fiscal_year}")]
    NaturalKeyConflict {
        company_id: String,
        fiscal_year: i32,
        existing_id: u64,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid score ladder for {axis}: {details}")]
    InvalidLadder { axis: String, details: String },

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BenchmarkError>;
