pub mod products;
pub mod referrals;
pub mod rewards;
pub mod shops;
pub mod transactions;
pub mod users;
