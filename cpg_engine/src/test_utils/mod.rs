pub mod mock_backend;
pub mod prepare_env;
