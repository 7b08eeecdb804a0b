/*!
The player side: everything the remote control needs to log in,
read playback state and send transport commands.
*/
pub mod auth;
pub mod lyrics;
pub mod spotify;
pub mod store;
