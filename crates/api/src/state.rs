use std::sync::Arc;

use spunkless_common::store::PgLogStore;

use crate::conf::ApiConfig;

pub struct ApiState {
    pub config: ApiConfig,
    pub store: PgLogStore,
}

pub type SharedState = Arc<ApiState>;
