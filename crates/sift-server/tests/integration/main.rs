mod api_tests;
mod common;
mod delivery_tests;
