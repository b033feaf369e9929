mod secret;

pub use self::secret::SecretGenerator;
