pub mod drive_test_environment;
