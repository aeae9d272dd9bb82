// Accessors for little endian fields stored as raw byte arrays, either as named struct fields
// or as ranges of a tuple struct's single array.
macro_rules! get_set_field {
    ($get_name:ident, $set_name:ident, $typ:ident) => {
        pub fn $get_name(&self) -> $typ {
            $typ::from_le_bytes(self.$get_name)
        }

        pub fn $set_name(&mut self, value: $typ) {
            self.$get_name = value.to_le_bytes();
        }
    };
}

macro_rules! get_set_field_tuple {
    ($get_name:ident, $set_name:ident, $typ:ident, $start:expr, $size:expr) => {
        pub fn $get_name(&self) -> $typ {
            let mut buf: [u8; $size] = [0; $size];
            buf.copy_from_slice(&self.0[$start..($start + $size)]);
            $typ::from_le_bytes(buf)
        }

        pub fn $set_name(&mut self, value: $typ) {
            self.0[$start..($start + $size)].copy_from_slice(&value.to_le_bytes());
        }
    };
}

pub(crate) use get_set_field;
pub(crate) use get_set_field_tuple;

/// True if every byte of `data` is zero.
pub(crate) fn is_zero(data: &[u8]) -> bool {
    let (prefix, words, suffix) = unsafe { data.align_to::<u64>() };
    prefix.iter().all(|b| *b == 0)
        && words.iter().all(|w| *w == 0)
        && suffix.iter().all(|b| *b == 0)
}

/// Bytes of padding needed to move `offset` up to the next multiple of `alignment`.
pub(crate) fn padding_for(offset: u64, alignment: u64) -> u64 {
    match offset % alignment {
        0 => 0,
        rem => alignment - rem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_detection() {
        assert!(is_zero(&[]));
        assert!(is_zero(&[0u8; 4099]));
        let mut data = vec![0u8; 4099];
        data[4098] = 1;
        assert!(!is_zero(&data));
        data[4098] = 0;
        data[3] = 0x80;
        assert!(!is_zero(&data));
    }

    #[test]
    fn padding() {
        assert_eq!(padding_for(0, 4096), 0);
        assert_eq!(padding_for(1, 4096), 4095);
        assert_eq!(padding_for(4096, 4096), 0);
        assert_eq!(padding_for(5000, 4096), 3192);
    }
}
