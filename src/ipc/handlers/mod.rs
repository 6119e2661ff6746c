pub mod analytics;
pub mod classes;
pub mod core;
pub mod gradebook;
pub mod grading;
pub mod quizzes;
