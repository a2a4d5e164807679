mod settings;

pub use settings::{
    BackendKind, LocalConfig, LoggingConfig, RemoteConfig, RemoteCredentials, Settings,
    StoreConfig, KEY_VAR, URL_VAR,
};
