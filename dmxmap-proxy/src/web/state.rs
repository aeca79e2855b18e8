//! Shared state behind the status endpoint.

use std::sync::Arc;

use crate::config::Config;
use crate::discovery::Discovery;
use crate::dispatcher::Dispatcher;

pub struct WebState {
    pub config: Arc<Config>,
    pub discovery: Arc<Discovery>,
    pub dispatcher: Arc<Dispatcher>,
}

impl WebState {
    pub fn new(
        config: Arc<Config>,
        discovery: Arc<Discovery>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        WebState {
            config,
            discovery,
            dispatcher,
        }
    }
}
