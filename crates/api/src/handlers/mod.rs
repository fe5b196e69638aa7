pub mod screenings;
pub mod subjects;
pub mod webhooks;
