pub mod ledger_reader;
pub mod wallet_writer;
