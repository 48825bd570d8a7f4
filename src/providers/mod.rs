pub mod eastmoney;
pub mod util;

pub use eastmoney::EastmoneyProvider;
