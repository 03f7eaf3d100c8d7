// 轉接層：domain ports 的具體實作
// `http` 對真實端點與檔案系統，`simulated` 是行程內的模擬平台

pub mod http;
pub mod simulated;
