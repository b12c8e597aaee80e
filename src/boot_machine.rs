use embedded_hal::serial;
use embedded_storage::nor_flash::NorFlash;
use groundhog::RollingTimer;

use crate::{
    comms::Comms,
    config::BootConfig,
    flash::AppFlash,
    packet::{Packet, PacketKind},
    sync::SyncDetector,
    timeout::Timeout,
};

/// Why a session ended early. Every variant is answered with one NACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum BootError {
    /// The host sent a valid frame that doesn't fit the current state
    ProtocolMismatch,
    Timeout,
    /// The announced image is empty or larger than the application region
    SizeViolation,
    EraseFailure,
    WriteFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum State {
    Sync,
    WaitForUpdateReq,
    DeviceIdReq,
    DeviceIdRes,
    FwLengthReq,
    FwLengthRes,
    EraseApplication,
    ReceiveFirmware,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Outcome {
    Updated,
    Failed(BootError),
}

/// Everything one update attempt knows about itself.
pub struct Session<T>
where
    T: RollingTimer<Tick = u32>,
{
    state: State,
    fw_length: u32,
    bytes_written: u32,
    timer: Timeout<T>,
}

impl<T> Session<T>
where
    T: RollingTimer<Tick = u32>,
{
    fn new(timer: T, budget: u32) -> Self {
        Self {
            state: State::Sync,
            fw_length: 0,
            bytes_written: 0,
            timer: Timeout::new(timer, budget, false),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn fw_length(&self) -> u32 {
        self.fw_length
    }

    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }
}

pub struct BootMachine<S, F, T>
where
    F: NorFlash,
    T: RollingTimer<Tick = u32>,
{
    comms: Comms<S>,
    flash: AppFlash<F>,
    sync: SyncDetector,
    session: Session<T>,
    config: BootConfig,
    packet: Packet,
    outcome: Option<Outcome>,
}

// This is the main interface for bootmachine. You basically create it
// and poll it until it produces an outcome, then hand off.
impl<S, F, T> BootMachine<S, F, T>
where
    S: serial::Read<u8> + serial::Write<u8>,
    F: NorFlash,
    T: RollingTimer<Tick = u32>,
{
    /// Start a new session in `Sync`. The response timer is armed from now.
    pub fn new(serial: S, flash: F, timer: T, config: BootConfig) -> Self {
        Self {
            comms: Comms::new(serial),
            flash: AppFlash::new(flash, &config),
            sync: SyncDetector::new(),
            session: Session::new(timer, config.response_timeout),
            config,
            packet: Packet::empty(),
            outcome: None,
        }
    }

    /// Run one step of the session. Never blocks waiting on the host.
    ///
    /// Returns the outcome once the session is over; polling after that
    /// does nothing.
    pub fn poll(&mut self) -> Option<Outcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }

        // Before sync the stream isn't framed yet
        if self.session.state != State::Sync {
            self.comms.update();
        }

        let state = self.session.state;
        let next = match state {
            State::Sync => self.sync(),
            State::WaitForUpdateReq => self.wait_for_update_req(),
            State::DeviceIdReq => self.device_id_req(),
            State::DeviceIdRes => self.device_id_res(),
            State::FwLengthReq => self.fw_length_req(),
            State::FwLengthRes => self.fw_length_res(),
            State::EraseApplication => self.erase_application(),
            State::ReceiveFirmware => self.receive_firmware(),
            State::Done => Ok(State::Done),
        };

        match next {
            Ok(next) => {
                if next != state {
                    sprkt_log!(info, "State: {:?}", next);
                }
                self.session.state = next;

                if next == State::Done {
                    sprkt_log!(info, "Update complete!");
                    self.outcome = Some(Outcome::Updated);
                }
            }
            Err(err) => self.fail(err),
        }

        self.outcome
    }

    /// Poll until the session ends.
    pub fn run(&mut self) -> Outcome {
        loop {
            if let Some(outcome) = self.poll() {
                return outcome;
            }
        }
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Give the UART and flash back, for teardown before the hand-off.
    pub fn release(self) -> (S, F) {
        (self.comms.release(), self.flash.release())
    }

    fn fail(&mut self, err: BootError) {
        sprkt_log!(error, "Session failed in {:?}: {:?}", self.session.state, err);
        self.comms.write_single(PacketKind::Nack);
        self.session.state = State::Done;
        self.outcome = Some(Outcome::Failed(err));
    }

    fn expire(&mut self, state: State) -> Result<State, BootError> {
        if self.session.timer.has_elapsed() {
            sprkt_log!(error, "Timed out waiting for the host!");
            Err(BootError::Timeout)
        } else {
            Ok(state)
        }
    }
}

// One handler per state. Each returns the state to be in after this poll,
// or the error that ends the session.
impl<S, F, T> BootMachine<S, F, T>
where
    S: serial::Read<u8> + serial::Write<u8>,
    F: NorFlash,
    T: RollingTimer<Tick = u32>,
{
    fn sync(&mut self) -> Result<State, BootError> {
        if let Some(byte) = self.comms.read_byte() {
            if self.sync.push(byte) {
                sprkt_log!(info, "Sync observed");
                self.comms.write_single(PacketKind::SyncObserved);
                self.session.timer.reset();
                return Ok(State::WaitForUpdateReq);
            }
        }

        self.expire(State::Sync)
    }

    fn wait_for_update_req(&mut self) -> Result<State, BootError> {
        if !self.comms.read(&mut self.packet) {
            return self.expire(State::WaitForUpdateReq);
        }

        if !self.packet.is_single_byte(PacketKind::FwUpdateRequest) {
            sprkt_log!(error, "Expected an update request!");
            return Err(BootError::ProtocolMismatch);
        }

        self.comms.write_single(PacketKind::FwUpdateResponse);
        Ok(State::DeviceIdReq)
    }

    fn device_id_req(&mut self) -> Result<State, BootError> {
        self.comms.write_single(PacketKind::DeviceIdRequest);
        self.session.timer.reset();
        Ok(State::DeviceIdRes)
    }

    fn device_id_res(&mut self) -> Result<State, BootError> {
        if !self.comms.read(&mut self.packet) {
            return self.expire(State::DeviceIdRes);
        }

        if !self.packet.is_device_id_response(self.config.device_id) {
            sprkt_log!(error, "Bad device ID response!");
            return Err(BootError::ProtocolMismatch);
        }

        Ok(State::FwLengthReq)
    }

    fn fw_length_req(&mut self) -> Result<State, BootError> {
        self.comms.write_single(PacketKind::FwLengthRequest);
        self.session.timer.reset();
        Ok(State::FwLengthRes)
    }

    fn fw_length_res(&mut self) -> Result<State, BootError> {
        if !self.comms.read(&mut self.packet) {
            return self.expire(State::FwLengthRes);
        }

        let fw_length = self.packet.fw_length().ok_or_else(|| {
            sprkt_log!(error, "Bad firmware length response!");
            BootError::ProtocolMismatch
        })?;

        if fw_length == 0 || fw_length > self.config.max_fw_length() {
            sprkt_log!(error, "Firmware length {=u32} won't fit!", fw_length);
            return Err(BootError::SizeViolation);
        }

        sprkt_log!(info, "Expecting {=u32} bytes of firmware", fw_length);
        self.session.fw_length = fw_length;
        Ok(State::EraseApplication)
    }

    fn erase_application(&mut self) -> Result<State, BootError> {
        self.flash.erase_application_region()?;

        self.session.bytes_written = 0;
        self.session.timer.reset();
        self.comms.write_single(PacketKind::ReadyForData);
        Ok(State::ReceiveFirmware)
    }

    fn receive_firmware(&mut self) -> Result<State, BootError> {
        if !self.comms.read(&mut self.packet) {
            return self.expire(State::ReceiveFirmware);
        }

        let address = self.config.app_base() + self.session.bytes_written;
        self.flash.write(address, self.packet.payload())?;

        // The last chunk may run past fw_length, that's fine
        self.session.bytes_written += self.packet.payload_len() as u32;

        if self.session.bytes_written >= self.session.fw_length {
            self.comms.write_single(PacketKind::UpdateSuccessful);
            return Ok(State::Done);
        }

        self.session.timer.reset();
        self.comms.write_single(PacketKind::ReadyForData);
        Ok(State::ReceiveFirmware)
    }
}
