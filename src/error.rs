// error.rs - 错误类型
//! 整形流程可以报告给请求边界的所有失败。

/// 解析、应用或执行整形指令时产生的错误
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("Malformed filter sequence: {0}")]
    MalformedFilterSequence(String),

    #[error("Unknown condition kind: {0}")]
    UnknownConditionKind(String),

    #[error("Invalid arguments for `{kind}` condition: {reason}")]
    InvalidConditionArguments { kind: String, reason: String },

    #[error("Can't eager load relations using a plain query backend: {0}")]
    UnsupportedRelationLoad(String),

    #[error("Backend does not support relation predicates (`{0}`)")]
    UnsupportedRelationPredicate(String),

    #[error("Nesting depth exceeds the configured maximum of {max}")]
    RecursionDepthExceeded { max: usize },

    #[error("Invalid relationship entry: {0}")]
    InvalidRelationship(String),

    #[error("Parameter `{name}` must be {expected}")]
    InvalidParameter { name: String, expected: &'static str },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model `{model}` has no relation `{relation}`")]
    UnknownRelation { model: String, relation: String },

    #[error("Record not found: {model} #{id}")]
    NotFound { model: String, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ShapeError {
    /// 稳定的机器可读错误码，供 `ErrorResponse` 使用
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedFilterSequence(_) => "malformed_filter_sequence",
            Self::UnknownConditionKind(_) => "unknown_condition_kind",
            Self::InvalidConditionArguments { .. } => "invalid_condition_arguments",
            Self::UnsupportedRelationLoad(_) => "unsupported_relation_load",
            Self::UnsupportedRelationPredicate(_) => "unsupported_relation_predicate",
            Self::RecursionDepthExceeded { .. } => "recursion_depth_exceeded",
            Self::InvalidRelationship(_) => "invalid_relationship",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::UnknownModel(_) => "unknown_model",
            Self::UnknownRelation { .. } => "unknown_relation",
            Self::NotFound { .. } => "not_found",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Toml(_) => "config_error",
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFilterSequence(reason.into())
    }

    pub(crate) fn bad_args(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConditionArguments {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

pub type ShapeResult<T> = Result<T, ShapeError>;
