pub mod chart_service;
pub mod emission_service;
pub mod trip_service;
