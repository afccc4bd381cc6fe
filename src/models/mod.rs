pub mod answer;
pub mod question;
pub mod student;
pub mod test;
pub mod test_attempt;
