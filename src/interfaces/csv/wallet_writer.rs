use crate::domain::wallet::Wallet;
use crate::error::Result;
use std::io::Write;

/// Writes the final wallet states as CSV: `owner,balance,currency`,
/// sorted by owner for deterministic output.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(target),
        }
    }

    pub fn write_wallets(&mut self, mut wallets: Vec<Wallet>) -> Result<()> {
        wallets.sort_by_key(|w| w.owner);

        self.writer.write_record(["owner", "balance", "currency"])?;
        for wallet in wallets {
            self.writer.write_record([
                wallet.owner.to_string(),
                wallet.balance.minor_units().to_string(),
                wallet.currency,
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
