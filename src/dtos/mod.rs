pub mod cart;
pub mod checkout;
pub mod delivery;
pub mod listing;
pub mod reservation;
pub mod user;
