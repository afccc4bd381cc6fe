pub mod staff_dto;
pub mod student_dto;
