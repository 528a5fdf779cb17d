pub mod db;
pub mod filterbank;
pub mod hilbert;
pub mod ideal_obs;
pub mod levenberg_marquardt;
pub mod psychometric;
pub mod util;
