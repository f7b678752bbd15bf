pub mod tuya_mock;
