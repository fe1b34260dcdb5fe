//! Synthetic packet builders shared by the unit tests. Sections carry zeroed
//! CRCs; the analyzer does not verify them.

use super::packet::TsPacket;
use super::time;
use super::TS_PACKET_SIZE;

/// Builds a packet with the given payload, padding with an adaptation field
/// of stuffing bytes when the payload is shorter than 184 bytes.
pub fn raw_packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> TsPacket {
    assert!(payload.len() <= 184, "payload too large for one packet");
    let mut bytes = [0xffu8; TS_PACKET_SIZE];
    bytes[0] = 0x47;
    bytes[1] = ((pid >> 8) & 0x1f) as u8 | if pusi { 0x40 } else { 0x00 };
    bytes[2] = (pid & 0xff) as u8;
    let offset = if payload.len() == 184 {
        bytes[3] = 0x10 | (cc & 0x0f);
        4
    } else {
        bytes[3] = 0x30 | (cc & 0x0f);
        let af_len = 183 - payload.len();
        bytes[4] = af_len as u8;
        if af_len > 0 {
            bytes[5] = 0x00;
        }
        5 + af_len
    };
    bytes[offset..offset + payload.len()].copy_from_slice(payload);
    TsPacket::from_array(bytes)
}

/// Adaptation-field-only packet carrying a PCR and no payload.
pub fn pcr_packet(pid: u16, cc: u8, pcr_base: u64) -> TsPacket {
    let mut bytes = [0xffu8; TS_PACKET_SIZE];
    bytes[0] = 0x47;
    bytes[1] = ((pid >> 8) & 0x1f) as u8;
    bytes[2] = (pid & 0xff) as u8;
    bytes[3] = 0x20 | (cc & 0x0f);
    bytes[4] = 183;
    bytes[5] = 0x10;
    bytes[6..12].copy_from_slice(&time::encode_pcr_base(pcr_base));
    TsPacket::from_array(bytes)
}

/// PSI packet: pointer field, section bytes, 0xff padding.
pub fn psi_packet(pid: u16, cc: u8, section: &[u8]) -> TsPacket {
    let mut payload = Vec::with_capacity(section.len() + 1);
    payload.push(0x00);
    payload.extend_from_slice(section);
    payload.resize(184, 0xff);
    let mut bytes = [0u8; TS_PACKET_SIZE];
    bytes[0] = 0x47;
    bytes[1] = 0x40 | ((pid >> 8) & 0x1f) as u8;
    bytes[2] = (pid & 0xff) as u8;
    bytes[3] = 0x10 | (cc & 0x0f);
    bytes[4..].copy_from_slice(&payload);
    TsPacket::from_array(bytes)
}

pub fn pat_section(program_number: u16, pmt_pid: u16) -> Vec<u8> {
    vec![
        0x00, // table_id
        0xb0,
        0x0d, // section_length = 13
        0x00,
        0x01, // transport_stream_id
        0xc1, // version 0, current_next 1
        0x00,
        0x00, // section numbers
        (program_number >> 8) as u8,
        (program_number & 0xff) as u8,
        0xe0 | ((pmt_pid >> 8) & 0x1f) as u8,
        (pmt_pid & 0xff) as u8,
        0x00,
        0x00,
        0x00,
        0x00, // CRC32
    ]
}

pub fn pmt_section(
    program_number: u16,
    pcr_pid: u16,
    video: (u8, u16),
    audio: (u8, u16),
) -> Vec<u8> {
    vec![
        0x02, // table_id
        0xb0,
        0x17, // section_length = 23
        (program_number >> 8) as u8,
        (program_number & 0xff) as u8,
        0xc1,
        0x00,
        0x00,
        0xe0 | ((pcr_pid >> 8) & 0x1f) as u8,
        (pcr_pid & 0xff) as u8,
        0xf0,
        0x00, // program_info_length = 0
        video.0,
        0xe0 | ((video.1 >> 8) & 0x1f) as u8,
        (video.1 & 0xff) as u8,
        0xf0,
        0x00,
        audio.0,
        0xe0 | ((audio.1 >> 8) & 0x1f) as u8,
        (audio.1 & 0xff) as u8,
        0xf0,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00, // CRC32
    ]
}

pub fn pat_packet(cc: u8, pmt_pid: u16) -> TsPacket {
    psi_packet(super::PID_PAT, cc, &pat_section(1, pmt_pid))
}

pub fn pmt_packet(pmt_pid: u16, cc: u8, pcr_pid: u16, video_pid: u16, audio_pid: u16) -> TsPacket {
    psi_packet(
        pmt_pid,
        cc,
        &pmt_section(
            1,
            pcr_pid,
            (super::STREAM_TYPE_H264, video_pid),
            (super::STREAM_TYPE_AAC_ADTS, audio_pid),
        ),
    )
}

fn pes_header(stream_id: u8, pts: u64, dts: Option<u64>) -> Vec<u8> {
    let mut header = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00, 0x80];
    match dts {
        Some(dts) => {
            header.push(0xc0);
            header.push(10);
            header.extend_from_slice(&time::encode_timestamp(time::MARKER_PTS_OF_PAIR, pts));
            header.extend_from_slice(&time::encode_timestamp(time::MARKER_DTS, dts));
        }
        None => {
            header.push(0x80);
            header.push(5);
            header.extend_from_slice(&time::encode_timestamp(time::MARKER_PTS_ONLY, pts));
        }
    }
    header
}

/// PES-start packet on a video PID with the given Annex-B NAL bodies
/// (start codes are inserted here).
pub fn video_pes_packet(
    pid: u16,
    cc: u8,
    pts: u64,
    dts: Option<u64>,
    nals: &[&[u8]],
) -> TsPacket {
    let mut payload = pes_header(0xe0, pts, dts);
    for nal in nals {
        payload.extend_from_slice(&[0x00, 0x00, 0x01]);
        payload.extend_from_slice(nal);
    }
    raw_packet(pid, true, cc, &payload)
}

/// PES-start packet on an audio PID with an ADTS-framed dummy payload.
pub fn audio_pes_packet(pid: u16, cc: u8, pts: u64) -> TsPacket {
    let mut payload = pes_header(0xc0, pts, None);
    payload.extend_from_slice(&[0xff, 0xf1, 0x50, 0x80, 0x02, 0x00, 0xfc, 0x21, 0x42]);
    raw_packet(pid, true, cc, &payload)
}

/// NAL bodies of a clean switch point: AUD, SPS, PPS, IDR slice. The slice
/// carries `marker` so tests can tell which source a packet came from.
pub fn idr_nals(marker: u8) -> Vec<Vec<u8>> {
    vec![
        vec![0x09, 0xf0],
        vec![0x67, 0x64, 0x00, 0x1f, 0xac, 0xd9],
        vec![0x68, 0xeb, 0xe3, 0xcb],
        vec![0x65, 0x88, 0x84, marker, marker],
    ]
}

/// NAL bodies of a non-IDR access unit.
pub fn non_idr_nals(marker: u8) -> Vec<Vec<u8>> {
    vec![vec![0x09, 0x30], vec![0x41, 0x9a, 0x24, marker, marker]]
}
