//! Per-bot exit-order scheduler.

use ocbot_core::BotId;
use ocbot_queue::{PriorityQueue, QueueMetrics, TaskHandle, TaskSpec};

use crate::config::OrdersConfig;
use crate::error::OrderError;
use crate::outcome::OrderOutcome;

pub type OrderTask = TaskSpec<OrderOutcome, OrderError>;
pub type OrderHandle = TaskHandle<OrderOutcome, OrderError>;

/// Priority queue dedicated to one bot's exit-order work.
///
/// Priority is the position's age in milliseconds, so a backlog drains
/// oldest-position-first regardless of arrival order.
#[derive(Clone)]
pub struct OrderPlacementScheduler {
    bot_id: BotId,
    queue: PriorityQueue<OrderOutcome, OrderError>,
}

impl OrderPlacementScheduler {
    pub fn new(bot_id: BotId, config: &OrdersConfig) -> Self {
        Self {
            bot_id,
            queue: PriorityQueue::new(format!("orders-bot-{bot_id}"), &config.scheduler_config()),
        }
    }

    pub fn bot_id(&self) -> BotId {
        self.bot_id
    }

    pub fn push(&self, task: OrderTask) -> OrderHandle {
        self.queue.push(task)
    }

    pub fn metrics(&self) -> QueueMetrics {
        self.queue.metrics()
    }

    pub fn close(&self) {
        self.queue.close();
    }
}
