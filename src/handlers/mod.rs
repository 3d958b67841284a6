mod app;
mod health;
mod uploads;

pub use app::get_hello;
pub use health::health_check;
pub use uploads::create_upload;
