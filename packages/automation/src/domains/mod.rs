pub mod deployments;
pub mod email;
