pub mod db;
pub mod whatsapp;

pub use db::DbAdapter;
pub use whatsapp::WhapiSender;
