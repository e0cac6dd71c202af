mod point;
mod station;
mod timestamp;
mod window;

pub use point::{WeatherPoint, WeatherSeries};
pub use station::{StationCatalog, StationMetadata};
pub use timestamp::UtcDateTime;
pub use window::DateWindow;
