use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{CommandDispatcher, RuleEngine, WindowAggregator};
use crate::expr::ExpressionCache;
use crate::gateway::ActuatorGateway;
use crate::store::ReadingsStore;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub readings: Arc<dyn ReadingsStore>,
    pub engine: Arc<RuleEngine>,
    pub dispatcher: CommandDispatcher,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: Config,
        readings: Arc<dyn ReadingsStore>,
        gateway: Arc<dyn ActuatorGateway>,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(db.clone(), gateway, config.command_timeout());
        let aggregator =
            WindowAggregator::new(readings.clone(), config.store_timeout(), config.stale_factor);
        let engine = RuleEngine::new(
            db.clone(),
            aggregator,
            ExpressionCache::new(config.expression_cache_capacity),
            dispatcher.clone(),
            config.eval_concurrency,
        );

        Self {
            db,
            config: Arc::new(config),
            readings,
            engine: Arc::new(engine),
            dispatcher,
        }
    }
}
