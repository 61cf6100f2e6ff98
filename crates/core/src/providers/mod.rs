pub mod traits;

// Collaborator implementations
pub mod greenflow_api;
pub mod manual_position;
