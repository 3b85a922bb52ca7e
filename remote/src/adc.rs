use anyhow::{Result, bail};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::info;

pub const ADC_CHANNELS: usize = 8;

/// MCP3008 10-bit ADC on SPI0.0.
pub struct AdcReader {
    spi: Spi,
}

impl AdcReader {
    pub fn new() -> Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_000_000, Mode::Mode0)?;
        info!("MCP3008 ADC initialized on SPI0.0");
        Ok(AdcReader { spi })
    }

    fn read_channel(&mut self, channel: u8) -> Result<u16> {
        if usize::from(channel) >= ADC_CHANNELS {
            bail!("channel must be 0-7, got {}", channel);
        }

        // start bit, single-ended mode + channel, padding
        let tx_buffer = [0x01, (0x08 | channel) << 4, 0x00];
        let mut rx_buffer = [0u8; 3];

        self.spi.transfer(&mut rx_buffer, &tx_buffer)?;

        Ok(decode_sample(rx_buffer))
    }

    pub fn read_all_channels(&mut self) -> Result<[u16; ADC_CHANNELS]> {
        let mut values = [0u16; ADC_CHANNELS];
        for (channel, value) in values.iter_mut().enumerate() {
            *value = self.read_channel(channel as u8)?;
        }
        Ok(values)
    }
}

/// The 10-bit sample is the low 2 bits of byte 1 and all of byte 2.
fn decode_sample(rx: [u8; 3]) -> u16 {
    (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2])
}
