mod model_loaders;

pub use model_loaders::load_owned_task_middleware;
