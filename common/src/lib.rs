pub mod dotenv;
pub mod elapsed;
pub mod env;

pub use dotenv::load_dotenv;
pub use elapsed::format_elapsed;
pub use env::EnvVarError;
pub use env::env_opt;
pub use env::env_or;
pub use env::required_env;
