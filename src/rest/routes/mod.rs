pub mod ai;
pub mod analytics;
pub mod auth;
pub mod calendar;
pub mod goals;
pub mod groups;
pub mod health;
pub mod leaderboard;
pub mod planner;
pub mod pomodoro;
pub mod tasks;
