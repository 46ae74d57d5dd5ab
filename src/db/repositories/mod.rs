pub mod events;
pub mod samples;
pub mod sensors;

pub use events::EventsRepository;
pub use samples::SamplesRepository;
pub use sensors::SensorsRepository;
