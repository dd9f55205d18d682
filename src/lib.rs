pub mod core {
    pub mod config;
    pub mod error;
    pub mod tracing_init;
}

pub mod models {
    pub mod transfer;
}

pub mod api {
    pub mod arr;
    pub mod client;
}

pub mod policy {
    pub mod classifier;
    pub mod scorer;
}

pub mod engine {
    #[cfg(test)]
    pub(crate) mod fake;
    pub mod queue;
    pub mod remediation;
    pub mod research;
}

pub mod utils {
    pub mod format;
    pub mod hash;
}
