pub mod chart;
pub mod emission;
pub mod geo;
pub mod settings;
pub mod trip;
pub mod vehicle;
