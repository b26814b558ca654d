use axum::Router as AxumRouter;
use kv_route_worker::{actor::SchedulerHandle, routes, state::WorkerState};
use kv_route_worker_cache::LatencyConfig;

pub struct Harness {
    pub app: AxumRouter,
    pub state: WorkerState,
}

pub fn build_harness(capacity: usize) -> Harness {
    let scheduler = SchedulerHandle::spawn(capacity, LatencyConfig::default());
    let state = WorkerState::new("w1".to_string(), scheduler);
    Harness {
        app: routes::build(state.clone()),
        state,
    }
}
