//! Card-type-specific record fields.

use super::CardType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields stored for a data card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataDetails {
    /// Storage format of the data (e.g. `parquet`, `csv`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Feature name to feature type.
    #[serde(default)]
    pub feature_map: BTreeMap<String, String>,
}

/// Fields stored for a model card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    /// Uid of the data card the model was trained on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacard_uid: Option<String>,
    /// Model flavor (e.g. `sklearn_estimator`, `transformers`).
    #[serde(default)]
    pub model_type: String,
    /// Type of the sample data saved alongside the model.
    #[serde(default)]
    pub sample_data_type: String,
}

/// Fields stored for a run card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    /// Data cards produced or used by the run.
    #[serde(default)]
    pub datacard_uids: Vec<String>,
    /// Model cards produced by the run.
    #[serde(default)]
    pub modelcard_uids: Vec<String>,
    /// Pipeline the run belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipelinecard_uid: Option<String>,
    /// Final metric values.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Fields stored for a pipeline card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDetails {
    /// Location of the pipeline code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_code_uri: Option<String>,
    /// Data cards the pipeline produced.
    #[serde(default)]
    pub datacard_uids: Vec<String>,
    /// Model cards the pipeline produced.
    #[serde(default)]
    pub modelcard_uids: Vec<String>,
    /// Runs executed by the pipeline.
    #[serde(default)]
    pub runcard_uids: Vec<String>,
}

/// Fields stored for an audit card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditDetails {
    /// Whether the audited cards were approved.
    #[serde(default)]
    pub approved: bool,
    /// Audited data cards.
    #[serde(default)]
    pub datacard_uids: Vec<String>,
    /// Audited model cards.
    #[serde(default)]
    pub modelcard_uids: Vec<String>,
}

/// Fields stored for a project card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetails {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Card-type-specific fields of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardDetails {
    /// Data card fields.
    Data(DataDetails),
    /// Model card fields.
    Model(ModelDetails),
    /// Run card fields.
    Run(RunDetails),
    /// Pipeline card fields.
    Pipeline(PipelineDetails),
    /// Audit card fields.
    Audit(AuditDetails),
    /// Project card fields.
    Project(ProjectDetails),
}

impl CardDetails {
    /// Empty details for a card type.
    #[must_use]
    pub fn empty(card_type: CardType) -> Self {
        match card_type {
            CardType::Data => Self::Data(DataDetails::default()),
            CardType::Model => Self::Model(ModelDetails::default()),
            CardType::Run => Self::Run(RunDetails::default()),
            CardType::Pipeline => Self::Pipeline(PipelineDetails::default()),
            CardType::Audit => Self::Audit(AuditDetails::default()),
            CardType::Project => Self::Project(ProjectDetails::default()),
        }
    }

    /// The card type these details belong to.
    #[must_use]
    pub fn card_type(&self) -> CardType {
        match self {
            Self::Data(_) => CardType::Data,
            Self::Model(_) => CardType::Model,
            Self::Run(_) => CardType::Run,
            Self::Pipeline(_) => CardType::Pipeline,
            Self::Audit(_) => CardType::Audit,
            Self::Project(_) => CardType::Project,
        }
    }

    /// Uids of other cards these details point at, with their card type.
    #[must_use]
    pub fn references(&self) -> Vec<(CardType, &str)> {
        fn tagged(card_type: CardType, uids: &[String]) -> impl Iterator<Item = (CardType, &str)> {
            uids.iter().map(move |uid| (card_type, uid.as_str()))
        }

        match self {
            Self::Data(_) | Self::Project(_) => Vec::new(),
            Self::Model(m) => m
                .datacard_uid
                .iter()
                .map(|uid| (CardType::Data, uid.as_str()))
                .collect(),
            Self::Run(r) => tagged(CardType::Data, &r.datacard_uids)
                .chain(tagged(CardType::Model, &r.modelcard_uids))
                .chain(
                    r.pipelinecard_uid
                        .iter()
                        .map(|uid| (CardType::Pipeline, uid.as_str())),
                )
                .collect(),
            Self::Pipeline(p) => tagged(CardType::Data, &p.datacard_uids)
                .chain(tagged(CardType::Model, &p.modelcard_uids))
                .chain(tagged(CardType::Run, &p.runcard_uids))
                .collect(),
            Self::Audit(a) => tagged(CardType::Data, &a.datacard_uids)
                .chain(tagged(CardType::Model, &a.modelcard_uids))
                .collect(),
        }
    }
}
