pub mod app_details;
