// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Network functions, command identifiers and completion codes.
//!
//! Commands are identified throughout the stack by a 16-bit value packing the
//! request NetFn in the high byte and the command code in the low byte. The
//! constants here cover the commands this controller implements or logs by
//! name; anything else renders as an unknown command.

use std::fmt;

/// IPMI network function codes (request variants).
pub mod netfn {
    pub const CHASSIS: u8 = 0x00;
    pub const BRIDGE: u8 = 0x02;
    pub const SENSOR_EVENT: u8 = 0x04;
    pub const APP: u8 = 0x06;
    pub const FIRMWARE: u8 = 0x08;
    pub const STORAGE: u8 = 0x0a;
    pub const TRANSPORT: u8 = 0x0c;
    pub const PICMG: u8 = 0x2c;
}

/// Convert a NetFn code to its request (even) form.
pub const fn request_netfn(netfn: u8) -> u8 {
    netfn & 0xfe
}

/// Convert a NetFn code to its response (odd) form.
pub const fn response_netfn(netfn: u8) -> u8 {
    netfn | 0x01
}

/// Convert a 16-bit command identifier to its request form.
pub const fn request_cmd(cmd: u16) -> u16 {
    cmd & 0xfeff
}

/// Convert a 16-bit command identifier to its response form.
pub const fn response_cmd(cmd: u16) -> u16 {
    cmd | 0x0100
}

/// Chassis device commands.
pub mod chassis {
    pub const GET_CHASSIS_CAPABILITIES: u16 = 0x0000;
    pub const GET_CHASSIS_STATUS: u16 = 0x0001;
    pub const CHASSIS_CONTROL: u16 = 0x0002;
    pub const CHASSIS_RESET: u16 = 0x0003;
    pub const CHASSIS_IDENTIFY: u16 = 0x0004;
    pub const GET_SYSTEM_RESTART_CAUSE: u16 = 0x0007;
    pub const GET_POH_COUNTER: u16 = 0x000f;
}

/// Event and sensor device commands.
pub mod sensor_event {
    pub const SET_EVENT_RECEIVER: u16 = 0x0400;
    pub const GET_EVENT_RECEIVER: u16 = 0x0401;
    pub const PLATFORM_EVENT: u16 = 0x0402;
    pub const GET_DEVICE_SDR_INFO: u16 = 0x0420;
    pub const GET_DEVICE_SDR: u16 = 0x0421;
    pub const RESERVE_DEVICE_SDR_REPOSITORY: u16 = 0x0422;
    pub const GET_SENSOR_READING_FACTORS: u16 = 0x0423;
    pub const SET_SENSOR_HYSTERESIS: u16 = 0x0424;
    pub const GET_SENSOR_HYSTERESIS: u16 = 0x0425;
    pub const SET_SENSOR_THRESHOLD: u16 = 0x0426;
    pub const GET_SENSOR_THRESHOLD: u16 = 0x0427;
    pub const SET_SENSOR_EVENT_ENABLE: u16 = 0x0428;
    pub const GET_SENSOR_EVENT_ENABLE: u16 = 0x0429;
    pub const REARM_SENSOR_EVENTS: u16 = 0x042a;
    pub const GET_SENSOR_EVENT_STATUS: u16 = 0x042b;
    pub const GET_SENSOR_READING: u16 = 0x042d;
    pub const SET_SENSOR_TYPE: u16 = 0x042e;
    pub const GET_SENSOR_TYPE: u16 = 0x042f;
}

/// IPM device "global" and messaging commands.
pub mod app {
    pub const GET_DEVICE_ID: u16 = 0x0601;
    pub const COLD_RESET: u16 = 0x0602;
    pub const WARM_RESET: u16 = 0x0603;
    pub const GET_SELF_TEST_RESULTS: u16 = 0x0604;
    pub const GET_DEVICE_GUID: u16 = 0x0608;
    pub const RESET_WATCHDOG_TIMER: u16 = 0x0622;
    pub const SET_WATCHDOG_TIMER: u16 = 0x0624;
    pub const GET_WATCHDOG_TIMER: u16 = 0x0625;
    pub const CLEAR_MESSAGE_FLAGS: u16 = 0x0630;
    pub const GET_MESSAGE_FLAGS: u16 = 0x0631;
    pub const GET_MESSAGE: u16 = 0x0633;
    pub const SEND_MESSAGE: u16 = 0x0634;
}

/// FRU inventory, SDR repository and SEL commands.
pub mod storage {
    pub const GET_FRU_INVENTORY_AREA_INFO: u16 = 0x0a10;
    pub const READ_FRU_DATA: u16 = 0x0a11;
    pub const WRITE_FRU_DATA: u16 = 0x0a12;
    pub const GET_SDR_REPOSITORY_INFO: u16 = 0x0a20;
    pub const RESERVE_SDR_REPOSITORY: u16 = 0x0a22;
    pub const GET_SDR: u16 = 0x0a23;
    pub const ADD_SDR: u16 = 0x0a24;
    pub const PARTIAL_ADD_SDR: u16 = 0x0a25;
    pub const DELETE_SDR: u16 = 0x0a26;
    pub const CLEAR_SDR_REPOSITORY: u16 = 0x0a27;
    pub const GET_SEL_INFO: u16 = 0x0a40;
    pub const RESERVE_SEL: u16 = 0x0a42;
    pub const GET_SEL_ENTRY: u16 = 0x0a43;
    pub const ADD_SEL_ENTRY: u16 = 0x0a44;
    pub const CLEAR_SEL: u16 = 0x0a47;
}

/// PICMG (AdvancedTCA) extension commands.
pub mod picmg {
    pub const GET_PICMG_PROPERTIES: u16 = 0x2c00;
    pub const GET_ADDRESS_INFO: u16 = 0x2c01;
    pub const FRU_CONTROL: u16 = 0x2c04;
    pub const GET_FRU_LED_PROPERTIES: u16 = 0x2c05;
    pub const GET_LED_COLOR_CAPABILITIES: u16 = 0x2c06;
    pub const SET_FRU_LED_STATE: u16 = 0x2c07;
    pub const GET_FRU_LED_STATE: u16 = 0x2c08;
    pub const SET_IPMB_STATE: u16 = 0x2c09;
    pub const SET_FRU_ACTIVATION_POLICY: u16 = 0x2c0a;
    pub const GET_FRU_ACTIVATION_POLICY: u16 = 0x2c0b;
    pub const SET_FRU_ACTIVATION: u16 = 0x2c0c;
    pub const GET_DEVICE_LOCATOR_RECORD_ID: u16 = 0x2c0d;
    pub const COMPUTE_POWER_PROPERTIES: u16 = 0x2c10;
    pub const SET_POWER_LEVEL: u16 = 0x2c11;
    pub const GET_POWER_LEVEL: u16 = 0x2c12;
    pub const RENEGOTIATE_POWER: u16 = 0x2c13;
    pub const FRU_CONTROL_CAPABILITIES: u16 = 0x2c1e;
}

/// Look up the human-readable name of a request command identifier, for log
/// rendering.
pub fn describe(netcmd: u16) -> Option<&'static str> {
    let name = match request_cmd(netcmd) {
        chassis::GET_CHASSIS_CAPABILITIES => "Get Chassis Capabilities",
        chassis::GET_CHASSIS_STATUS => "Get Chassis Status",
        chassis::CHASSIS_CONTROL => "Chassis Control",
        chassis::CHASSIS_RESET => "Chassis Reset",
        chassis::CHASSIS_IDENTIFY => "Chassis Identify",
        chassis::GET_SYSTEM_RESTART_CAUSE => "Get System Restart Cause",
        chassis::GET_POH_COUNTER => "Get POH Counter",
        sensor_event::SET_EVENT_RECEIVER => "Set Event Receiver",
        sensor_event::GET_EVENT_RECEIVER => "Get Event Receiver",
        sensor_event::PLATFORM_EVENT => "Platform Event",
        sensor_event::GET_DEVICE_SDR_INFO => "Get Device SDR Info",
        sensor_event::GET_DEVICE_SDR => "Get Device SDR",
        sensor_event::RESERVE_DEVICE_SDR_REPOSITORY => "Reserve Device SDR Repository",
        sensor_event::GET_SENSOR_READING_FACTORS => "Get Sensor Reading Factors",
        sensor_event::SET_SENSOR_HYSTERESIS => "Set Sensor Hysteresis",
        sensor_event::GET_SENSOR_HYSTERESIS => "Get Sensor Hysteresis",
        sensor_event::SET_SENSOR_THRESHOLD => "Set Sensor Threshold",
        sensor_event::GET_SENSOR_THRESHOLD => "Get Sensor Threshold",
        sensor_event::SET_SENSOR_EVENT_ENABLE => "Set Sensor Event Enable",
        sensor_event::GET_SENSOR_EVENT_ENABLE => "Get Sensor Event Enable",
        sensor_event::REARM_SENSOR_EVENTS => "Rearm Sensor Events",
        sensor_event::GET_SENSOR_EVENT_STATUS => "Get Sensor Event Status",
        sensor_event::GET_SENSOR_READING => "Get Sensor Reading",
        sensor_event::SET_SENSOR_TYPE => "Set Sensor Type",
        sensor_event::GET_SENSOR_TYPE => "Get Sensor Type",
        app::GET_DEVICE_ID => "Get Device ID",
        app::COLD_RESET => "Cold Reset",
        app::WARM_RESET => "Warm Reset",
        app::GET_SELF_TEST_RESULTS => "Get Self Test Results",
        app::GET_DEVICE_GUID => "Get Device GUID",
        app::RESET_WATCHDOG_TIMER => "Reset Watchdog Timer",
        app::SET_WATCHDOG_TIMER => "Set Watchdog Timer",
        app::GET_WATCHDOG_TIMER => "Get Watchdog Timer",
        app::CLEAR_MESSAGE_FLAGS => "Clear Message Flags",
        app::GET_MESSAGE_FLAGS => "Get Message Flags",
        app::GET_MESSAGE => "Get Message",
        app::SEND_MESSAGE => "Send Message",
        storage::GET_FRU_INVENTORY_AREA_INFO => "Get FRU Inventory Area Info",
        storage::READ_FRU_DATA => "Read FRU Data",
        storage::WRITE_FRU_DATA => "Write FRU Data",
        storage::GET_SDR_REPOSITORY_INFO => "Get SDR Repository Info",
        storage::RESERVE_SDR_REPOSITORY => "Reserve SDR Repository",
        storage::GET_SDR => "Get SDR",
        storage::ADD_SDR => "Add SDR",
        storage::PARTIAL_ADD_SDR => "Partial Add SDR",
        storage::DELETE_SDR => "Delete SDR",
        storage::CLEAR_SDR_REPOSITORY => "Clear SDR Repository",
        storage::GET_SEL_INFO => "Get SEL Info",
        storage::RESERVE_SEL => "Reserve SEL",
        storage::GET_SEL_ENTRY => "Get SEL Entry",
        storage::ADD_SEL_ENTRY => "Add SEL Entry",
        storage::CLEAR_SEL => "Clear SEL",
        picmg::GET_PICMG_PROPERTIES => "Get PICMG Properties",
        picmg::GET_ADDRESS_INFO => "Get Address Info",
        picmg::FRU_CONTROL => "FRU Control",
        picmg::GET_FRU_LED_PROPERTIES => "Get FRU LED Properties",
        picmg::GET_LED_COLOR_CAPABILITIES => "Get LED Color Capabilities",
        picmg::SET_FRU_LED_STATE => "Set FRU LED State",
        picmg::GET_FRU_LED_STATE => "Get FRU LED State",
        picmg::SET_IPMB_STATE => "Set IPMB State",
        picmg::SET_FRU_ACTIVATION_POLICY => "Set FRU Activation Policy",
        picmg::GET_FRU_ACTIVATION_POLICY => "Get FRU Activation Policy",
        picmg::SET_FRU_ACTIVATION => "Set FRU Activation",
        picmg::GET_DEVICE_LOCATOR_RECORD_ID => "Get Device Locator Record ID",
        picmg::COMPUTE_POWER_PROPERTIES => "Compute Power Properties",
        picmg::SET_POWER_LEVEL => "Set Power Level",
        picmg::GET_POWER_LEVEL => "Get Power Level",
        picmg::RENEGOTIATE_POWER => "Renegotiate Power",
        picmg::FRU_CONTROL_CAPABILITIES => "FRU Control Capabilities",
        _ => return None,
    };
    Some(name)
}

/// An IPMI completion code, the first data byte of every response.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(feature = "api-traits", test),
    derive(schemars::JsonSchema, serde::Deserialize, serde::Serialize)
)]
#[cfg_attr(any(feature = "api-traits", test), serde(rename_all = "snake_case"))]
pub enum CompletionCode {
    Success,
    NodeBusy,
    InvalidCommand,
    CommandInvalidForLun,
    ProcessingTimeout,
    OutOfSpace,
    ReservationCancelled,
    RequestDataTruncated,
    RequestDataLengthInvalid,
    RequestDataFieldLengthLimitExceeded,
    ParameterOutOfRange,
    CannotReturnRequestedBytes,
    RequestedDataNotPresent,
    InvalidDataFieldInRequest,
    CommandIllegalForSensorOrRecordType,
    CommandResponseCouldNotBeProvided,
    CannotExecuteDuplicatedRequest,
    SdrRepositoryInUpdateMode,
    DeviceInFirmwareUpdateMode,
    BmcInitializationInProgress,
    DestinationUnavailable,
    InsufficientPrivilege,
    NotSupportedInPresentState,
    SubFunctionDisabled,
    UnspecifiedError,
    /// OEM or command-specific code (0x80..=0xbe, plus device-specific use of
    /// 0x01..=0x7e).
    CommandSpecific(u8),
    Reserved(u8),
}

impl From<u8> for CompletionCode {
    fn from(x: u8) -> Self {
        use CompletionCode::*;
        match x {
            0x00 => Success,
            0xc0 => NodeBusy,
            0xc1 => InvalidCommand,
            0xc2 => CommandInvalidForLun,
            0xc3 => ProcessingTimeout,
            0xc4 => OutOfSpace,
            0xc5 => ReservationCancelled,
            0xc6 => RequestDataTruncated,
            0xc7 => RequestDataLengthInvalid,
            0xc8 => RequestDataFieldLengthLimitExceeded,
            0xc9 => ParameterOutOfRange,
            0xca => CannotReturnRequestedBytes,
            0xcb => RequestedDataNotPresent,
            0xcc => InvalidDataFieldInRequest,
            0xcd => CommandIllegalForSensorOrRecordType,
            0xce => CommandResponseCouldNotBeProvided,
            0xcf => CannotExecuteDuplicatedRequest,
            0xd0 => SdrRepositoryInUpdateMode,
            0xd1 => DeviceInFirmwareUpdateMode,
            0xd2 => BmcInitializationInProgress,
            0xd3 => DestinationUnavailable,
            0xd4 => InsufficientPrivilege,
            0xd5 => NotSupportedInPresentState,
            0xd6 => SubFunctionDisabled,
            0xff => UnspecifiedError,
            0x01..=0x7e | 0x80..=0xbe => CommandSpecific(x),
            _ => Reserved(x),
        }
    }
}

impl From<CompletionCode> for u8 {
    fn from(code: CompletionCode) -> u8 {
        use CompletionCode::*;
        match code {
            Success => 0x00,
            NodeBusy => 0xc0,
            InvalidCommand => 0xc1,
            CommandInvalidForLun => 0xc2,
            ProcessingTimeout => 0xc3,
            OutOfSpace => 0xc4,
            ReservationCancelled => 0xc5,
            RequestDataTruncated => 0xc6,
            RequestDataLengthInvalid => 0xc7,
            RequestDataFieldLengthLimitExceeded => 0xc8,
            ParameterOutOfRange => 0xc9,
            CannotReturnRequestedBytes => 0xca,
            RequestedDataNotPresent => 0xcb,
            InvalidDataFieldInRequest => 0xcc,
            CommandIllegalForSensorOrRecordType => 0xcd,
            CommandResponseCouldNotBeProvided => 0xce,
            CannotExecuteDuplicatedRequest => 0xcf,
            SdrRepositoryInUpdateMode => 0xd0,
            DeviceInFirmwareUpdateMode => 0xd1,
            BmcInitializationInProgress => 0xd2,
            DestinationUnavailable => 0xd3,
            InsufficientPrivilege => 0xd4,
            NotSupportedInPresentState => 0xd5,
            SubFunctionDisabled => 0xd6,
            UnspecifiedError => 0xff,
            CommandSpecific(x) => x,
            Reserved(x) => x,
        }
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CompletionCode::*;
        match self {
            Success => write!(f, "Success"),
            NodeBusy => write!(f, "Node Busy"),
            InvalidCommand => write!(f, "Invalid Command"),
            CommandInvalidForLun => write!(f, "Command Invalid For LUN"),
            ProcessingTimeout => write!(f, "Processing Timeout"),
            OutOfSpace => write!(f, "Out Of Space"),
            ReservationCancelled => write!(f, "Reservation Cancelled"),
            RequestDataTruncated => write!(f, "Request Data Truncated"),
            RequestDataLengthInvalid => write!(f, "Request Data Length Invalid"),
            RequestDataFieldLengthLimitExceeded => {
                write!(f, "Request Data Field Length Limit Exceeded")
            }
            ParameterOutOfRange => write!(f, "Parameter Out Of Range"),
            CannotReturnRequestedBytes => {
                write!(f, "Cannot Return Requested Number Of Data Bytes")
            }
            RequestedDataNotPresent => {
                write!(f, "Requested Sensor, Data, Or Record Not Present")
            }
            InvalidDataFieldInRequest => write!(f, "Invalid Data Field In Request"),
            CommandIllegalForSensorOrRecordType => {
                write!(f, "Command Illegal For Specified Sensor Or Record Type")
            }
            CommandResponseCouldNotBeProvided => {
                write!(f, "Command Response Could Not Be Provided")
            }
            CannotExecuteDuplicatedRequest => write!(f, "Cannot Execute Duplicated Request"),
            SdrRepositoryInUpdateMode => write!(f, "SDR Repository In Update Mode"),
            DeviceInFirmwareUpdateMode => write!(f, "Device In Firmware Update Mode"),
            BmcInitializationInProgress => write!(f, "BMC Initialization In Progress"),
            DestinationUnavailable => write!(f, "Destination Unavailable"),
            InsufficientPrivilege => write!(f, "Insufficient Privilege"),
            NotSupportedInPresentState => {
                write!(f, "Command Or Parameters Not Supported In Present State")
            }
            SubFunctionDisabled => write!(f, "Command Sub-function Disabled Or Unavailable"),
            UnspecifiedError => write!(f, "Unspecified Error"),
            CommandSpecific(x) => write!(f, "Command-specific ({x:02x})"),
            Reserved(x) => write!(f, "Reserved ({x:02x})"),
        }
    }
}

bitflags::bitflags! {
    /// The sensor status byte returned by Get Sensor Reading.
    ///
    /// See IPMI2 section 35.14: byte 2 of the response carries the event and
    /// scanning enables, plus the reading-unavailable flag.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct SensorStatus: u8 {
        /// All event messages from this sensor are enabled.
        const EVENTS_ENABLED    = 0b1000_0000;

        /// Sensor scanning is enabled.
        const SCANNING_ENABLED  = 0b0100_0000;

        /// A reading or state update is in progress; the reading bytes should
        /// be ignored.
        const READING_UNAVAILABLE = 0b0010_0000;
    }
}
