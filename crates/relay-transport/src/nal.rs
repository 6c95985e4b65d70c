//! H.264 Annex B to FLV video tag packetizing.
//!
//! Drone and camera feeds hand over H.264 in Annex B form (start-code
//! delimited NAL units). RTMP carries FLV video tags holding AVCC data
//! (length-prefixed NAL units), preceded once by an AVC decoder
//! configuration record built from the stream's SPS and PPS.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

const NAL_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_AUD: u8 = 9;

const FLV_CODEC_AVC: u8 = 7;
const FLV_FRAME_KEY: u8 = 1;
const FLV_FRAME_INTER: u8 = 2;
const AVC_SEQUENCE_HEADER: u8 = 0;
const AVC_NALU: u8 = 1;

fn nal_type(nal: &[u8]) -> u8 {
    nal[0] & 0x1F
}

/// Iterator over the NAL units of an Annex B buffer, start codes removed.
struct NalUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NalUnits<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

/// Position of the next three-byte start code at or after `from`.
fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(3)
        .position(|w| w == [0, 0, 1])
        .map(|offset| from + offset)
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            let start = find_start_code(self.data, self.pos)? + 3;
            let mut end = match find_start_code(self.data, start) {
                Some(next) => {
                    self.pos = next;
                    next
                }
                None => {
                    self.pos = self.data.len();
                    self.data.len()
                }
            };

            // NAL units never end in a zero byte; trailing zeros belong to
            // the next four-byte start code.
            while end > start && self.data[end - 1] == 0 {
                end -= 1;
            }

            if end > start {
                return Some(&self.data[start..end]);
            }
        }
    }
}

/// One FLV video tag body, ready for an RTMP video message.
#[derive(Debug, Clone)]
pub struct FlvVideoTag {
    /// Tag body.
    pub data: Bytes,

    /// Contains an IDR slice (or is the sequence header).
    pub is_keyframe: bool,

    /// AVC decoder configuration record rather than picture data.
    pub is_sequence_header: bool,
}

/// Turns Annex B access units into FLV video tags.
///
/// Picture data is held back until both SPS and PPS have been seen, since
/// a player cannot decode anything before the sequence header. A changed
/// SPS or PPS produces a fresh sequence header.
#[derive(Debug, Default)]
pub struct FlvVideoPacketizer {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    header_sent: bool,
    units_without_header: u64,
}

impl FlvVideoPacketizer {
    /// Create a packetizer with no parameter sets seen yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Packetize one access unit. Returns zero, one or two tags.
    pub fn packetize(&mut self, access_unit: &[u8]) -> Vec<FlvVideoTag> {
        let mut avcc = BytesMut::with_capacity(access_unit.len() + 16);
        let mut keyframe = false;

        for nal in NalUnits::new(access_unit) {
            match nal_type(nal) {
                NAL_SPS => self.update_parameter_set(nal, true),
                NAL_PPS => self.update_parameter_set(nal, false),
                NAL_AUD => {}
                kind => {
                    keyframe |= kind == NAL_IDR;
                    avcc.put_u32(nal.len() as u32);
                    avcc.put_slice(nal);
                }
            }
        }

        let mut tags = Vec::with_capacity(2);

        if !self.header_sent {
            if let Some(record) = self.decoder_config() {
                tags.push(FlvVideoTag {
                    data: video_tag(FLV_FRAME_KEY, AVC_SEQUENCE_HEADER, &record),
                    is_keyframe: true,
                    is_sequence_header: true,
                });
                self.header_sent = true;
                debug!("AVC sequence header ready");
            }
        }

        if !avcc.is_empty() {
            if self.header_sent {
                let frame_type = if keyframe { FLV_FRAME_KEY } else { FLV_FRAME_INTER };
                tags.push(FlvVideoTag {
                    data: video_tag(frame_type, AVC_NALU, &avcc),
                    is_keyframe: keyframe,
                    is_sequence_header: false,
                });
            } else {
                self.units_without_header += 1;
            }
        }

        tags
    }

    /// Access units discarded because no sequence header was available.
    pub fn units_without_header(&self) -> u64 {
        self.units_without_header
    }

    fn update_parameter_set(&mut self, nal: &[u8], is_sps: bool) {
        let slot = if is_sps { &mut self.sps } else { &mut self.pps };
        if slot.as_deref() != Some(nal) {
            *slot = Some(Bytes::copy_from_slice(nal));
            self.header_sent = false;
        }
    }

    /// AVCDecoderConfigurationRecord (ISO/IEC 14496-15).
    fn decoder_config(&self) -> Option<Bytes> {
        let sps = self.sps.as_ref()?;
        let pps = self.pps.as_ref()?;
        if sps.len() < 4 {
            return None;
        }

        let mut record = BytesMut::with_capacity(11 + sps.len() + pps.len());
        record.put_u8(1); // configurationVersion
        record.put_u8(sps[1]); // AVCProfileIndication
        record.put_u8(sps[2]); // profile_compatibility
        record.put_u8(sps[3]); // AVCLevelIndication
        record.put_u8(0xFF); // 4-byte NAL lengths
        record.put_u8(0xE1); // one SPS
        record.put_u16(sps.len() as u16);
        record.put_slice(sps);
        record.put_u8(1); // one PPS
        record.put_u16(pps.len() as u16);
        record.put_slice(pps);
        Some(record.freeze())
    }
}

fn video_tag(frame_type: u8, packet_type: u8, body: &[u8]) -> Bytes {
    let mut tag = BytesMut::with_capacity(5 + body.len());
    tag.put_u8((frame_type << 4) | FLV_CODEC_AVC);
    tag.put_u8(packet_type);
    tag.put_slice(&[0, 0, 0]); // composition time
    tag.put_slice(body);
    tag.freeze()
}
