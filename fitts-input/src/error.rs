use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("malformed pointing device URI `{0}`")]
    MalformedUri(String),

    #[error("unsupported pointing device scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("invalid value `{value}` for device parameter `{key}`")]
    InvalidParameter { key: String, value: String },

    #[error("pointing device queue is closed")]
    Disconnected,

    #[error("failed to spawn input pump thread")]
    Spawn(#[source] std::io::Error),
}
