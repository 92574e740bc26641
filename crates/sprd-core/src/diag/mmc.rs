//! eMMC access through Socrates.

use byteorder::{BigEndian, ByteOrder};
use std::io::Write;
use tracing::{debug, info, instrument};

use super::{DiagCommand, SocratesClient, expect_len};
use crate::error::{ProtocolError, Result};
use crate::protocol::Packet;
use crate::protocol::constants::MMC_BLOCK_SIZE;
use crate::transport::UsbTransport;

/// One eMMC block.
pub type Block = [u8; MMC_BLOCK_SIZE];

impl<T: UsbTransport> SocratesClient<T> {
    #[instrument(skip(self))]
    pub fn mmc_init(&mut self) -> Result<()> {
        self.transact(&Packet::new(DiagCommand::ReqMmcInit), DiagCommand::RspOk)?;
        info!("eMMC initialized");
        Ok(())
    }

    /// Select a hardware partition (user area, boot partitions, RPMB).
    #[instrument(skip(self))]
    pub fn mmc_switch(&mut self, partition: u8) -> Result<()> {
        self.transact(
            &Packet::with_payload(DiagCommand::ReqMmcSwitch, [partition]),
            DiagCommand::RspOk,
        )?;
        Ok(())
    }

    /// Number of blocks in the selected partition.
    #[instrument(skip(self))]
    pub fn mmc_sector_count(&mut self) -> Result<u32> {
        let response = self.transact(
            &Packet::new(DiagCommand::ReqMmcGetSecCount),
            DiagCommand::RspMmcGetSecCount,
        )?;
        let data = expect_len(&response, 4)?;
        let count = BigEndian::read_u32(&data);
        info!(sectors = count, bytes = count as u64 * MMC_BLOCK_SIZE as u64, "eMMC size");
        Ok(count)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn mmc_read_block(&mut self, lba: u32) -> Result<Block> {
        let mut request = [0u8; 4];
        BigEndian::write_u32(&mut request, lba);

        let response = self.transact(
            &Packet::with_payload(DiagCommand::ReqMmcReadSingleBlock, request),
            DiagCommand::RspMmcReadSingleBlock,
        )?;
        let data = expect_len(&response, MMC_BLOCK_SIZE)?;

        let mut block = [0u8; MMC_BLOCK_SIZE];
        block.copy_from_slice(&data);
        Ok(block)
    }

    #[instrument(skip(self, block), level = "debug")]
    pub fn mmc_write_block(&mut self, lba: u32, block: &Block) -> Result<()> {
        let mut request = Vec::with_capacity(4 + MMC_BLOCK_SIZE);
        request.extend_from_slice(&lba.to_be_bytes());
        request.extend_from_slice(block);

        self.transact(
            &Packet::with_payload(DiagCommand::ReqMmcWriteBlock, request),
            DiagCommand::RspOk,
        )?;
        Ok(())
    }

    /// Read `count` blocks starting at `lba` into `sink`.
    pub fn mmc_read_blocks<W: Write>(&mut self, lba: u32, count: u32, sink: W) -> Result<()> {
        self.mmc_read_blocks_with_progress(lba, count, sink, |_, _| {})
    }

    /// Like `mmc_read_blocks`, calling `progress(done, count)` after each block.
    ///
    /// The whole range must be addressable; nothing is read otherwise.
    #[instrument(skip(self, sink, progress))]
    pub fn mmc_read_blocks_with_progress<W, F>(
        &mut self,
        lba: u32,
        count: u32,
        mut sink: W,
        mut progress: F,
    ) -> Result<()>
    where
        W: Write,
        F: FnMut(u32, u32),
    {
        if count > 0 && lba.checked_add(count - 1).is_none() {
            return Err(ProtocolError::LbaOutOfRange { lba, count }.into());
        }

        for i in 0..count {
            let block = self.mmc_read_block(lba + i)?;
            sink.write_all(&block)?;
            progress(i + 1, count);
        }
        sink.flush()?;
        debug!(blocks = count, "Block range read");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{client, diag_frame};
    use super::*;
    use crate::error::{Error, ProtocolError};
    use crate::transport::MockTransport;

    fn block_of(fill: u8) -> Block {
        [fill; MMC_BLOCK_SIZE]
    }

    #[test]
    fn test_init_and_switch() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspOk, &[]));
        mock.queue_read(&diag_frame(DiagCommand::RspOk, &[]));
        let mut soc = client(&mock);

        soc.mmc_init().unwrap();
        soc.mmc_switch(1).unwrap();
        assert_eq!(
            mock.get_writes(),
            vec![vec![0x00, 0x09, 0x00, 0x00], vec![0x00, 0x0A, 0x00, 0x01, 0x01]]
        );
    }

    #[test]
    fn test_sector_count() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(
            DiagCommand::RspMmcGetSecCount,
            &[0x00, 0x74, 0x40, 0x00],
        ));
        let mut soc = client(&mock);
        assert_eq!(soc.mmc_sector_count().unwrap(), 0x0074_4000);
    }

    #[test]
    fn test_read_block() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspMmcReadSingleBlock, &block_of(0xA5)));
        let mut soc = client(&mock);

        let block = soc.mmc_read_block(0x10).unwrap();
        assert!(block.iter().all(|&b| b == 0xA5));
        assert_eq!(
            mock.get_writes()[0],
            vec![0x00, 0x0C, 0x00, 0x04, 0x00, 0x00, 0x00, 0x10]
        );
    }

    #[test]
    fn test_read_block_short() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspMmcReadSingleBlock, &[0u8; 100]));
        let mut soc = client(&mock);
        assert!(matches!(
            soc.mmc_read_block(0),
            Err(Error::Protocol(ProtocolError::PayloadLength {
                expected: 512,
                actual: 100
            }))
        ));
    }

    #[test]
    fn test_write_block() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspOk, &[]));
        let mut soc = client(&mock);

        soc.mmc_write_block(7, &block_of(0x3C)).unwrap();
        let writes = mock.get_writes();
        let sent = &writes[0];
        assert_eq!(sent.len(), 4 + 4 + MMC_BLOCK_SIZE);
        assert_eq!(sent[..8], [0x00, 0x0D, 0x02, 0x04, 0x00, 0x00, 0x00, 0x07]);
        assert!(sent[8..].iter().all(|&b| b == 0x3C));
    }

    #[test]
    fn test_read_blocks_into_sink() {
        let mock = MockTransport::new();
        for fill in 0..3u8 {
            mock.queue_read(&diag_frame(DiagCommand::RspMmcReadSingleBlock, &block_of(fill)));
        }
        let mut soc = client(&mock);

        let mut out = Vec::new();
        let mut seen = Vec::new();
        soc.mmc_read_blocks_with_progress(100, 3, &mut out, |done, total| seen.push((done, total)))
            .unwrap();

        assert_eq!(out.len(), 3 * MMC_BLOCK_SIZE);
        assert_eq!(out[MMC_BLOCK_SIZE], 1);
        assert_eq!(out[2 * MMC_BLOCK_SIZE], 2);
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);

        let lbas: Vec<u32> = mock
            .get_writes()
            .iter()
            .map(|w| BigEndian::read_u32(&w[4..8]))
            .collect();
        assert_eq!(lbas, vec![100, 101, 102]);
    }

    #[test]
    fn test_read_blocks_rejects_range_past_lba_space() {
        let mock = MockTransport::new();
        let mut soc = client(&mock);

        let mut out = Vec::new();
        let err = soc.mmc_read_blocks(u32::MAX - 1, 3, &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::LbaOutOfRange {
                lba: 0xFFFF_FFFE,
                count: 3
            })
        ));
        assert!(out.is_empty());
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_read_blocks_up_to_last_lba() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspMmcReadSingleBlock, &block_of(1)));
        mock.queue_read(&diag_frame(DiagCommand::RspMmcReadSingleBlock, &block_of(2)));
        let mut soc = client(&mock);

        let mut out = Vec::new();
        soc.mmc_read_blocks(u32::MAX - 1, 2, &mut out).unwrap();
        assert_eq!(out.len(), 2 * MMC_BLOCK_SIZE);

        let lbas: Vec<u32> = mock
            .get_writes()
            .iter()
            .map(|w| BigEndian::read_u32(&w[4..8]))
            .collect();
        assert_eq!(lbas, vec![u32::MAX - 1, u32::MAX]);
    }

    #[test]
    fn test_read_blocks_stops_on_device_error() {
        let mock = MockTransport::new();
        mock.queue_read(&diag_frame(DiagCommand::RspMmcReadSingleBlock, &block_of(0)));
        mock.queue_read(&diag_frame(DiagCommand::RspError, &[]));
        let mut soc = client(&mock);

        let mut out = Vec::new();
        let err = soc.mmc_read_blocks(0, 4, &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::DeviceError { .. })
        ));
        assert_eq!(out.len(), MMC_BLOCK_SIZE);
        assert_eq!(mock.get_writes().len(), 2);
    }
}
