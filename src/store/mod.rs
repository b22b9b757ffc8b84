//! Data store modules for Supabase integration

pub mod players;
pub mod rounds;
pub mod supabase;

pub use players::PlayerStore;
pub use rounds::RoundStore;
pub use supabase::SupabaseClient;
