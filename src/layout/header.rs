use std::fmt;

/// Size of the iNES header in front of the PRG data.
pub const HEADER_SIZE: usize = 16;

const MAGIC: &[u8; 3] = b"NES";
const SENTINEL: u8 = 0x1A;

/// Values of the `.ines*` directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InesHeader {
    pub prg_count: u8,
    pub chr_count: u8,
    pub mapper: u8,
    pub mirroring: u8,
}

impl InesHeader {
    /// The 16 header bytes: magic, sentinel, bank counts and the mapper/mirroring byte.
    ///
    /// Extended mapper bits in byte 7 are not supported and stay zero.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut header = [0; HEADER_SIZE];

        header[0..3].copy_from_slice(MAGIC);
        header[3] = SENTINEL;
        header[4] = self.prg_count;
        header[5] = self.chr_count;
        header[6] = (self.mapper & 0x0F) << 4 | (self.mirroring & 0x0F);

        header
    }
}

impl fmt::Display for InesHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self
            .to_bytes()
            .iter()
            .map(|byte| format!("{:02X}", byte))
            .collect::<Vec<String>>()
            .join(" ");
        write!(f, "{}", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_mapper_and_mirroring_share_byte_6() {
        let header = InesHeader {
            mapper: 5,
            mirroring: 6,
            ..Default::default()
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes[6], 0x56);
        assert_eq!(bytes[7], 0);
    }

    #[test]
    fn test_header_bytes() {
        let header = InesHeader {
            prg_count: 16,
            chr_count: 16,
            mapper: 4,
            mirroring: 0,
        };

        assert_eq!(
            header.to_string(),
            "4E 45 53 1A 10 10 40 00 00 00 00 00 00 00 00 00"
        );
    }
}
